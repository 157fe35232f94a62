use indexmap::IndexMap;
use tracing::debug;
use xmltree::Element;

use crate::document::{element, push_child, text_element, DocumentBuilder};
use crate::model::{StructField, VariableSection, VariableStruct};

/// Fills every enabled section with its members. Sections the document
/// never opened are skipped without error.
pub fn emit_sections(builder: &mut DocumentBuilder, sections: &[VariableSection]) {
    let kind = builder.kind();
    let retain = kind.has_retain_semantics();
    for section in sections {
        let Some(target) = builder.section_mut(section.name) else {
            debug!(
                section = section.name.as_str(),
                kind = %kind,
                "dropping section not supported by block kind"
            );
            continue;
        };
        for member in &section.members {
            push_child(target, render_member(member, retain));
        }
    }
}

pub fn render_member(member: &VariableStruct, retain: bool) -> Element {
    let mut el = element(
        "Member",
        &[("Name", member.name.as_str()), ("Datatype", member.datatype.as_str())],
    );
    if retain {
        let remanence = if member.retain { "Retain" } else { "NonRetain" };
        el.attributes
            .insert("Remanence".to_string(), remanence.to_string());
    }
    el.attributes
        .insert("Accessibility".to_string(), "Public".to_string());

    if !member.start_value.is_empty() {
        push_child(&mut el, text_element("StartValue", &member.start_value));
    }
    if let Some(attributes) = boolean_attributes(&member.attributes) {
        push_child(&mut el, attributes);
    }
    el
}

/// Member of a user data type: name and datatype only.
pub fn render_struct_field(field: &StructField) -> Element {
    let mut el = element(
        "Member",
        &[("Name", field.name.as_str()), ("Datatype", field.datatype.as_str())],
    );
    if let Some(attributes) = boolean_attributes(&field.attributes) {
        push_child(&mut el, attributes);
    }
    el
}

/// Read-only member the importer expects to exist, e.g. OB start info.
pub fn informative_member(name: &str, datatype: &str) -> Element {
    element(
        "Member",
        &[("Name", name), ("Datatype", datatype), ("Informative", "true")],
    )
}

fn boolean_attributes(attributes: &IndexMap<String, bool>) -> Option<Element> {
    if attributes.is_empty() {
        return None;
    }
    let mut list = Element::new("AttributeList");
    for (name, value) in attributes {
        let mut attribute = text_element("BooleanAttribute", if *value { "true" } else { "false" });
        attribute.attributes.insert("Name".to_string(), name.clone());
        attribute
            .attributes
            .insert("SystemDefined".to_string(), "true".to_string());
        push_child(&mut list, attribute);
    }
    Some(list)
}
