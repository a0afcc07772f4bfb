use tera::Tera;
use std::sync::Mutex;
use anyhow::Result;
use std::path::Path;
use tracing::debug;

pub const POPUP_TEMPLATE: &str = "popup.html";
pub const ICON_TEMPLATE: &str = "icon.svg";

const BUILTIN_POPUP: &str = r#"<div>
<div class="popup-title">{{ title }}</div>
{%- if image_url %}
<div class="popup-image-container"><img src="{{ image_url }}" alt="Camera photo" class="popup-image" onerror="this.style.display='none'; this.parentElement.innerHTML='<small class=image-loading>Image unavailable</small>'" /></div>
{%- endif %}
{%- for row in rows %}
<div class="popup-row"><div class="popup-label">{{ row.label }}:</div><div class="popup-value">{{ row.value }}</div></div>
{%- endfor %}
<div class="popup-row"><div class="popup-label">Coordinates:</div><div class="popup-value">{{ latitude }}°, {{ longitude }}°</div></div>
</div>"#;

const BUILTIN_ICON: &str = r##"<svg width="40" height="40" viewBox="0 0 40 40" xmlns="http://www.w3.org/2000/svg">
<circle cx="20" cy="20" r="16" fill="#fafafa" stroke="#4a4a4a" stroke-width="2.5"/>
<circle cx="20" cy="20" r="11.5" fill="none" stroke="{{ color }}" stroke-width="2.5"/>
<g transform="translate(20, 20)">
<rect x="-7" y="-3.9" width="5" height="1.8" fill="{{ color }}" rx="0.6"/>
<rect x="2" y="-3.9" width="5" height="1.8" fill="{{ color }}" rx="0.6"/>
<rect x="-7" y="0" width="5" height="1.8" fill="{{ color }}" rx="0.6"/>
<rect x="2" y="0" width="5" height="1.8" fill="{{ color }}" rx="0.6"/>
<rect x="-7" y="3.9" width="5" height="1.8" fill="{{ color }}" rx="0.6"/>
<rect x="2" y="3.9" width="5" height="1.8" fill="{{ color }}" rx="0.6"/>
</g>
</svg>"##;

pub struct TemplateEngine {
    tera: Mutex<Tera>,
}

impl TemplateEngine {

    /// Built-in popup and icon templates, overridden by any `*.html`/`*.svg`
    /// file of the same name under `override_dir`.
    pub fn new(override_dir: Option<&Path>) -> Result<Self> {
        let mut tera = match override_dir {
            Some(dir) if dir.exists() => {
                let pattern = format!("{}/**/*.{{html,svg}}", dir.to_string_lossy());
                match Tera::new(&pattern) {
                    Ok(t) => t,
                    Err(e) => {
                        // No matching files is fine, the built-ins cover it
                        if e.to_string().contains("no templates found") || e.to_string().contains("match any files") {
                            Tera::default()
                        } else {
                            return Err(e.into());
                        }
                    }
                }
            }
            _ => Tera::default(),
        };

        let loaded: Vec<String> = tera.get_template_names().map(str::to_string).collect();
        for (name, source) in [(POPUP_TEMPLATE, BUILTIN_POPUP), (ICON_TEMPLATE, BUILTIN_ICON)] {
            if loaded.iter().any(|l| l == name) {
                debug!("using template override: {}", name);
            } else {
                tera.add_raw_template(name, source)?;
            }
        }

        tera.autoescape_on(vec![".html"]);

        Ok(Self {
            tera: Mutex::new(tera),
        })
    }

    pub fn render(&self, template_name: &str, context: &tera::Context) -> Result<String> {

        let tera = self.tera.lock().map_err(|_| anyhow::anyhow!("template engine lock poisoned"))?;

        tera.render(template_name, context).map_err(|e| {

            let loaded = tera.get_template_names().collect::<Vec<_>>();

            anyhow::anyhow!("Tera Render Error: {}. Requested: '{}'. Loaded: {:?}", e, template_name, loaded)

        })

    }

}
