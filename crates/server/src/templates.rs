use std::collections::HashMap;
use std::sync::Arc;

use b24desk_core::deals::stage_label;
use tera::{Tera, Value};
use tracing::warn;

/// Built-in copies of every page, used for any template the configured
/// directory does not provide.
const EMBEDDED_TEMPLATES: &[(&str, &str)] = &[
    ("base.html", include_str!("../../../templates/base.html")),
    ("error.html", include_str!("../../../templates/error.html")),
    ("home/index.html", include_str!("../../../templates/home/index.html")),
    ("deals/index.html", include_str!("../../../templates/deals/index.html")),
    ("employees/index.html", include_str!("../../../templates/employees/index.html")),
    ("companies_map/index.html", include_str!("../../../templates/companies_map/index.html")),
    ("contacts/index.html", include_str!("../../../templates/contacts/index.html")),
    ("contacts/export.html", include_str!("../../../templates/contacts/export.html")),
    ("contacts/import.html", include_str!("../../../templates/contacts/import.html")),
    ("product_qr/index.html", include_str!("../../../templates/product_qr/index.html")),
    ("product_qr/generated.html", include_str!("../../../templates/product_qr/generated.html")),
    ("product_qr/view.html", include_str!("../../../templates/product_qr/view.html")),
];

pub fn init_templates(templates_dir: &str) -> Arc<Tera> {
    let pattern = format!("{}/**/*.html", templates_dir.trim_end_matches('/'));
    let mut tera = match Tera::new(&pattern) {
        Ok(tera) => tera,
        Err(error) => {
            warn!(
                event_name = "system.templates.load_failed",
                templates_dir,
                error = %error,
                "failed to load templates from filesystem, using embedded copies"
            );
            Tera::default()
        }
    };

    let loaded: Vec<String> = tera.get_template_names().map(str::to_string).collect();
    let missing: Vec<(&str, &str)> = EMBEDDED_TEMPLATES
        .iter()
        .copied()
        .filter(|(name, _)| !loaded.iter().any(|loaded| loaded == name))
        .collect();
    if let Err(error) = tera.add_raw_templates(missing) {
        warn!(
            event_name = "system.templates.embedded_failed",
            error = %error,
            "failed to register embedded templates"
        );
    }

    register_filters(&mut tera);
    Arc::new(tera)
}

pub fn register_filters(tera: &mut Tera) {
    tera.register_filter("stage_label", stage_label_filter);
}

/// `{{ deal.stage_id | stage_label }}`
fn stage_label_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let stage_id =
        value.as_str().ok_or_else(|| tera::Error::msg("stage_label filter expects a string"))?;
    Ok(Value::String(stage_label(stage_id).to_string()))
}

#[cfg(test)]
mod tests {
    use tera::Context;

    use super::init_templates;

    #[test]
    fn embedded_templates_fill_in_for_missing_directory() {
        let tera = init_templates("/nonexistent/b24desk-templates");

        for name in ["base.html", "error.html", "deals/index.html", "product_qr/view.html"] {
            assert!(tera.get_template_names().any(|loaded| loaded == name), "{name} missing");
        }
    }

    #[test]
    fn stage_label_filter_translates_known_stages() {
        let mut tera = tera::Tera::default();
        super::register_filters(&mut tera);
        tera.add_raw_template("stage", "{{ stage | stage_label }}").expect("template");

        let mut context = Context::new();
        context.insert("stage", "WON");
        let won = tera.render("stage", &context).expect("render");
        context.insert("stage", "CUSTOM_1");
        let custom = tera.render("stage", &context).expect("render");

        assert_eq!(won, "Успешно реализована");
        assert_eq!(custom, "CUSTOM_1");
    }
}
