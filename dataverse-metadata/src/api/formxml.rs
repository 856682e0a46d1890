//! Field extraction from form XML definitions.

use std::collections::HashSet;

/// Extract the lowercase logical names of all data-bound controls in a form
/// definition.
///
/// The markup comes from the remote system and is not under our control, so a
/// malformed document yields an empty set rather than an error.
pub fn extract_form_fields(form_xml: &str) -> HashSet<String> {
    let mut fields = HashSet::new();

    let doc = match roxmltree::Document::parse(form_xml) {
        Ok(doc) => doc,
        Err(err) => {
            log::warn!("Could not parse form XML: {}", err);
            return fields;
        }
    };

    for control in doc.descendants().filter(|n| n.has_tag_name("control")) {
        if let Some(field) = control.attribute("datafieldname") {
            if !field.is_empty() {
                fields.insert(field.to_lowercase());
            }
        }
    }

    fields
}
