use indexmap::IndexMap;
use tracing::debug;

use crate::document::{element, push_child, BlockDocument, DocumentBuilder};
use crate::error::GenerateError;
use crate::model::{
    BlockDetails, EventClass, ProgramBlock, ProgramBlockKind, SectionName, StructField,
};
use crate::network::compile_networks;
use crate::variables::{emit_sections, informative_member, render_struct_field};

const OB_NUMBER_RANGE: (u32, u32) = (123, 32767);
const GLOBAL_DB_NUMBER_RANGE: (u32, u32) = (1, 599_999);
const DATA_BLOCK_LANGUAGE: &str = "DB";

/// Block number after the kind's range rules. OB 1 is the main cycle and
/// keeps its number.
pub fn normalize_number(kind: ProgramBlockKind, requested: u32) -> u32 {
    match kind {
        ProgramBlockKind::OrganizationBlock if requested == 1 => 1,
        ProgramBlockKind::OrganizationBlock => requested.clamp(OB_NUMBER_RANGE.0, OB_NUMBER_RANGE.1),
        ProgramBlockKind::GlobalDataBlock => {
            requested.clamp(GLOBAL_DB_NUMBER_RANGE.0, GLOBAL_DB_NUMBER_RANGE.1)
        }
        _ => requested,
    }
}

/// Assembles the complete import document of a synthesized block.
pub fn build_document(block: &ProgramBlock) -> Result<BlockDocument, GenerateError> {
    let kind = block.kind();
    if !kind.has_networks() && !block.networks.is_empty() {
        return Err(GenerateError::NetworksNotSupported {
            block: block.name.clone(),
            kind,
        });
    }

    let document = match &block.details {
        BlockDetails::OrganizationBlock { event_class } => organization_block(block, *event_class)?,
        BlockDetails::FunctionBlock => function_block(block)?,
        BlockDetails::Function => function(block)?,
        BlockDetails::GlobalDataBlock { attributes } => global_data_block(block, attributes),
        BlockDetails::UserDataType { fields } => user_data_type(block, fields),
    };
    debug!(block = %block.name, kind = %kind, "assembled block document");
    Ok(document)
}

fn header(block: &ProgramBlock, language: &str) -> DocumentBuilder {
    let kind = block.kind();
    DocumentBuilder::for_block(
        kind,
        &block.name,
        normalize_number(kind, block.number),
        language,
    )
}

fn push_networks(builder: &mut DocumentBuilder, block: &ProgramBlock) -> Result<(), GenerateError> {
    for unit in compile_networks(&block.name, &block.programming_language, &block.networks)? {
        builder.push_object(unit);
    }
    Ok(())
}

fn organization_block(
    block: &ProgramBlock,
    event_class: EventClass,
) -> Result<BlockDocument, GenerateError> {
    let mut builder = header(block, &block.programming_language);
    builder.attribute("SecondaryType", event_class.as_str());
    if let Some(input) = builder.section_mut(SectionName::Input) {
        push_child(input, informative_member("Initial_Call", "Bool"));
        push_child(input, informative_member("Remanence", "Bool"));
    }
    emit_sections(&mut builder, &block.sections);
    push_networks(&mut builder, block)?;
    Ok(builder.finish())
}

fn function_block(block: &ProgramBlock) -> Result<BlockDocument, GenerateError> {
    let mut builder = header(block, &block.programming_language);
    emit_sections(&mut builder, &block.sections);
    push_networks(&mut builder, block)?;
    Ok(builder.finish())
}

fn function(block: &ProgramBlock) -> Result<BlockDocument, GenerateError> {
    let mut builder = header(block, &block.programming_language);
    if let Some(ret) = builder.section_mut(SectionName::Return) {
        push_child(ret, element("Member", &[("Name", "Ret_Val"), ("Datatype", "Void")]));
    }
    emit_sections(&mut builder, &block.sections);
    push_networks(&mut builder, block)?;
    Ok(builder.finish())
}

fn global_data_block(block: &ProgramBlock, attributes: &IndexMap<String, String>) -> BlockDocument {
    let mut builder = header(block, DATA_BLOCK_LANGUAGE);
    for (name, value) in attributes {
        builder.attribute(name, value);
    }
    emit_sections(&mut builder, &block.sections);
    builder.finish()
}

fn user_data_type(block: &ProgramBlock, fields: &[StructField]) -> BlockDocument {
    let mut builder = DocumentBuilder::new(ProgramBlockKind::UserDataType, &block.name);
    let section = builder.open_unnamed_section();
    for field in fields {
        push_child(section, render_struct_field(field));
    }
    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NetworkSource, VariableSection, VariableStruct};
    use xmltree::Element;

    fn block_element(doc: &BlockDocument) -> &Element {
        doc.block_element().expect("block element")
    }

    fn attribute_text(doc: &BlockDocument, name: &str) -> Option<String> {
        block_element(doc)
            .get_child("AttributeList")
            .and_then(|a| a.get_child(name))
            .and_then(|e| e.get_text())
            .map(|t| t.into_owned())
    }

    fn section<'d>(doc: &'d BlockDocument, name: &str) -> &'d Element {
        block_element(doc)
            .get_child("AttributeList")
            .and_then(|a| a.get_child("Interface"))
            .and_then(|i| i.get_child("Sections"))
            .and_then(|s| {
                s.children
                    .iter()
                    .filter_map(|n| n.as_element())
                    .find(|e| e.attributes.get("Name").map(String::as_str) == Some(name))
            })
            .expect("section")
    }

    fn member_names(section: &Element) -> Vec<String> {
        section
            .children
            .iter()
            .filter_map(|n| n.as_element())
            .map(|e| e.attributes["Name"].clone())
            .collect()
    }

    #[test]
    fn organization_block_numbers_are_clamped() {
        let kind = ProgramBlockKind::OrganizationBlock;
        assert_eq!(normalize_number(kind, 1), 1);
        assert_eq!(normalize_number(kind, 50), 123);
        assert_eq!(normalize_number(kind, 40000), 32767);
        assert_eq!(normalize_number(kind, 200), 200);
    }

    #[test]
    fn global_data_block_numbers_are_clamped() {
        let kind = ProgramBlockKind::GlobalDataBlock;
        assert_eq!(normalize_number(kind, 0), 1);
        assert_eq!(normalize_number(kind, 700_000), 599_999);
        assert_eq!(normalize_number(ProgramBlockKind::FunctionBlock, 0), 0);
    }

    #[test]
    fn organization_block_has_event_class_and_informative_inputs() {
        let mut block = ProgramBlock::new(
            BlockDetails::OrganizationBlock {
                event_class: EventClass::Startup,
            },
            "Startup",
            50,
        );
        block.sections.push(VariableSection {
            name: SectionName::Input,
            members: vec![VariableStruct::new("Extra", "Bool")],
        });
        let doc = build_document(&block).expect("document");
        assert_eq!(attribute_text(&doc, "Number").as_deref(), Some("123"));
        assert_eq!(attribute_text(&doc, "SecondaryType").as_deref(), Some("Startup"));
        assert_eq!(
            member_names(section(&doc, "Input")),
            ["Initial_Call", "Remanence", "Extra"]
        );
    }

    #[test]
    fn function_returns_void() {
        let block = ProgramBlock::new(BlockDetails::Function, "Scale", 4);
        let doc = build_document(&block).expect("document");
        let ret = section(&doc, "Return");
        let members = ret
            .children
            .iter()
            .filter_map(|n| n.as_element())
            .collect::<Vec<_>>();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].attributes["Name"], "Ret_Val");
        assert_eq!(members[0].attributes["Datatype"], "Void");
    }

    #[test]
    fn global_data_block_forces_language_and_appends_attributes() {
        let mut attributes = IndexMap::new();
        attributes.insert("MemoryLayout".to_string(), "Optimized".to_string());
        let mut block = ProgramBlock::new(
            BlockDetails::GlobalDataBlock { attributes },
            "Settings",
            700_000,
        );
        block.programming_language = "SCL".to_string();
        let mut counter = VariableStruct::new("Counter", "Int");
        counter.retain = false;
        block.sections.push(VariableSection {
            name: SectionName::Static,
            members: vec![counter],
        });

        let doc = build_document(&block).expect("document");
        assert_eq!(attribute_text(&doc, "Number").as_deref(), Some("599999"));
        assert_eq!(attribute_text(&doc, "ProgrammingLanguage").as_deref(), Some("DB"));
        let last = block_element(&doc)
            .get_child("AttributeList")
            .and_then(|a| a.children.iter().filter_map(|n| n.as_element()).last())
            .expect("attribute");
        assert_eq!(last.name, "MemoryLayout");
        let member = section(&doc, "Static")
            .get_child("Member")
            .expect("member");
        assert_eq!(member.attributes["Remanence"], "NonRetain");
    }

    #[test]
    fn user_data_type_is_degenerate() {
        let block = ProgramBlock::new(
            BlockDetails::UserDataType {
                fields: vec![StructField {
                    name: "Setpoint".to_string(),
                    datatype: "Real".to_string(),
                    attributes: IndexMap::new(),
                }],
            },
            "Recipe",
            1,
        );
        let doc = build_document(&block).expect("document");
        assert_eq!(doc.block_element().map(|b| b.name.as_str()), Some("SW.Types.PlcStruct"));
        assert!(attribute_text(&doc, "Number").is_none());
        assert!(block_element(&doc).get_child("ObjectList").is_none());
        let member = section(&doc, "None").get_child("Member").expect("member");
        assert!(member.attributes.get("Accessibility").is_none());
    }

    #[test]
    fn data_kinds_reject_networks() {
        let mut block = ProgramBlock::new(
            BlockDetails::GlobalDataBlock {
                attributes: IndexMap::new(),
            },
            "Settings",
            1,
        );
        block.networks.push(NetworkSource::default());
        let err = build_document(&block).unwrap_err();
        assert!(matches!(err, GenerateError::NetworksNotSupported { .. }));
    }

    #[test]
    fn compile_units_are_numbered_from_three() {
        let mut block = ProgramBlock::new(BlockDetails::FunctionBlock, "Motor_Ctrl", 10);
        block.networks = vec![NetworkSource::default(), NetworkSource::default()];
        let doc = build_document(&block).expect("document");
        let ids = block_element(&doc)
            .get_child("ObjectList")
            .map(|o| {
                o.children
                    .iter()
                    .filter_map(|n| n.as_element())
                    .map(|e| e.attributes["ID"].clone())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        assert_eq!(ids, ["3", "8"]);
    }
}
