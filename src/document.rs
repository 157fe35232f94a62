use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;
use xmltree::{Element, EmitterConfig, XMLNode};

use crate::error::GenerateError;
use crate::model::{ProgramBlockKind, SectionName};

pub const INTERFACE_NAMESPACE: &str = "http://www.siemens.com/automation/Openness/SW/Interface/v5";
pub const FLGNET_NAMESPACE: &str =
    "http://www.siemens.com/automation/Openness/SW/NetworkSource/FlgNet/v4";

pub const INSTANCE_DB_ROOT: &str = "SW.Blocks.InstanceDB";

/// Section name used by the single section of a user data type.
pub const UNNAMED_SECTION: &str = "None";

pub(crate) fn element(name: &str, attributes: &[(&str, &str)]) -> Element {
    let mut el = Element::new(name);
    for (key, value) in attributes {
        el.attributes.insert((*key).to_string(), (*value).to_string());
    }
    el
}

/// Element holding `text`; empty text yields an empty element.
pub(crate) fn text_element(name: &str, text: &str) -> Element {
    let mut el = Element::new(name);
    if !text.is_empty() {
        el.children.push(XMLNode::Text(text.to_string()));
    }
    el
}

pub(crate) fn push_child(parent: &mut Element, child: Element) {
    parent.children.push(XMLNode::Element(child));
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SectionSlot {
    Named(SectionName),
    Unnamed,
}

/// Accumulates the parts of an import document and assembles them in the
/// order the importer expects.
#[derive(Debug, Clone)]
pub struct DocumentBuilder {
    kind: ProgramBlockKind,
    name: String,
    sections: Vec<(SectionSlot, Element)>,
    attributes: Vec<Element>,
    objects: Vec<Element>,
}

impl DocumentBuilder {
    pub fn new(kind: ProgramBlockKind, name: &str) -> Self {
        Self {
            kind,
            name: name.to_string(),
            sections: Vec::new(),
            attributes: Vec::new(),
            objects: Vec::new(),
        }
    }

    /// Standard block header shared by every non-type kind.
    pub fn for_block(kind: ProgramBlockKind, name: &str, number: u32, language: &str) -> Self {
        let mut builder = Self::new(kind, name);
        builder.attribute("Number", &number.to_string());
        builder.attribute("ProgrammingLanguage", language);
        for section in kind.enabled_sections() {
            builder.open_section(*section);
        }
        builder
    }

    pub fn kind(&self) -> ProgramBlockKind {
        self.kind
    }

    /// Appends a text attribute after the ones already present.
    pub fn attribute(&mut self, name: &str, text: &str) {
        self.attributes.push(text_element(name, text));
    }

    pub fn open_section(&mut self, section: SectionName) -> &mut Element {
        self.open_slot(SectionSlot::Named(section), section.as_str())
    }

    pub fn open_unnamed_section(&mut self) -> &mut Element {
        self.open_slot(SectionSlot::Unnamed, UNNAMED_SECTION)
    }

    fn open_slot(&mut self, slot: SectionSlot, label: &str) -> &mut Element {
        let index = match self.sections.iter().position(|(s, _)| *s == slot) {
            Some(index) => index,
            None => {
                self.sections
                    .push((slot, element("Section", &[("Name", label)])));
                self.sections.len() - 1
            }
        };
        &mut self.sections[index].1
    }

    /// The opened section, or `None` when this document never enabled it.
    pub fn section_mut(&mut self, section: SectionName) -> Option<&mut Element> {
        self.sections
            .iter_mut()
            .find(|(slot, _)| *slot == SectionSlot::Named(section))
            .map(|(_, el)| el)
    }

    pub fn unnamed_section_mut(&mut self) -> Option<&mut Element> {
        self.sections
            .iter_mut()
            .find(|(slot, _)| *slot == SectionSlot::Unnamed)
            .map(|(_, el)| el)
    }

    pub fn is_enabled(&self, section: SectionName) -> bool {
        self.sections
            .iter()
            .any(|(slot, _)| *slot == SectionSlot::Named(section))
    }

    pub fn push_object(&mut self, object: Element) {
        self.objects.push(object);
    }

    pub fn finish(self) -> BlockDocument {
        let mut sections = element("Sections", &[("xmlns", INTERFACE_NAMESPACE)]);
        for (_, section) in self.sections {
            push_child(&mut sections, section);
        }
        let mut interface = Element::new("Interface");
        push_child(&mut interface, sections);

        let mut attribute_list = Element::new("AttributeList");
        push_child(&mut attribute_list, text_element("Name", &self.name));
        push_child(&mut attribute_list, interface);
        push_child(&mut attribute_list, Element::new("Namespace"));
        for attribute in self.attributes {
            push_child(&mut attribute_list, attribute);
        }

        let mut block = element(self.kind.document_root(), &[("ID", "0")]);
        push_child(&mut block, attribute_list);
        if self.kind != ProgramBlockKind::UserDataType {
            let mut object_list = Element::new("ObjectList");
            for object in self.objects {
                push_child(&mut object_list, object);
            }
            push_child(&mut block, object_list);
        }

        let mut root = Element::new("Document");
        push_child(&mut root, block);
        BlockDocument {
            kind: self.kind,
            name: self.name,
            root,
        }
    }
}

/// A finished import document.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockDocument {
    kind: ProgramBlockKind,
    name: String,
    root: Element,
}

impl BlockDocument {
    pub fn kind(&self) -> ProgramBlockKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    /// The kind-specific element directly under `<Document>`.
    pub fn block_element(&self) -> Option<&Element> {
        self.root.get_child(self.kind.document_root())
    }

    pub fn to_xml_bytes(&self, pretty: bool) -> Result<Vec<u8>, GenerateError> {
        serialize(&self.root, pretty)
    }

    pub fn to_xml_string(&self, pretty: bool) -> Result<String, GenerateError> {
        let bytes = self.to_xml_bytes(pretty)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn write_to(&self, path: &Path, pretty: bool) -> Result<(), GenerateError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_xml_bytes(pretty)?)?;
        Ok(())
    }

    /// Writes the document to a temporary `.xml` file removed on drop.
    pub fn write_temp(&self) -> Result<NamedTempFile, GenerateError> {
        let mut temp = tempfile::Builder::new()
            .prefix(&format!("{}_", sanitize_file_stem(&self.name)))
            .suffix(".xml")
            .tempfile()?;
        temp.write_all(&self.to_xml_bytes(false)?)?;
        temp.flush()?;
        Ok(temp)
    }
}

fn serialize(root: &Element, pretty: bool) -> Result<Vec<u8>, GenerateError> {
    let config = EmitterConfig::new()
        .perform_indent(pretty)
        .write_document_declaration(true);
    let mut out = Vec::new();
    root.write_with_config(&mut out, config)?;
    Ok(out)
}

/// Record of an instance data block created for a single-instance call.
pub fn instance_db_xml(name: &str, number: u32, instance_of: &str) -> Result<Vec<u8>, GenerateError> {
    let mut attribute_list = Element::new("AttributeList");
    push_child(&mut attribute_list, text_element("InstanceOfName", instance_of));
    push_child(&mut attribute_list, text_element("Name", name));
    push_child(&mut attribute_list, text_element("Number", &number.to_string()));
    let mut block = element(INSTANCE_DB_ROOT, &[("ID", "0")]);
    push_child(&mut block, attribute_list);
    let mut root = Element::new("Document");
    push_child(&mut root, block);
    serialize(&root, false)
}

pub(crate) fn sanitize_file_stem(name: &str) -> String {
    let cleaned = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect::<String>();
    let trimmed = cleaned.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        "block".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section_names(doc: &BlockDocument) -> Vec<String> {
        doc.block_element()
            .and_then(|b| b.get_child("AttributeList"))
            .and_then(|a| a.get_child("Interface"))
            .and_then(|i| i.get_child("Sections"))
            .map(|s| {
                s.children
                    .iter()
                    .filter_map(|n| n.as_element())
                    .map(|e| e.attributes["Name"].clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    #[test]
    fn block_header_has_fixed_attribute_order() {
        let doc = DocumentBuilder::for_block(ProgramBlockKind::FunctionBlock, "Motor", 7, "FBD")
            .finish();
        let block = doc.block_element().expect("block element");
        assert_eq!(block.attributes["ID"], "0");
        let names = block
            .get_child("AttributeList")
            .expect("attribute list")
            .children
            .iter()
            .filter_map(|n| n.as_element())
            .map(|e| e.name.clone())
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            ["Name", "Interface", "Namespace", "Number", "ProgrammingLanguage"]
        );
        assert!(block.get_child("ObjectList").is_some());
    }

    #[test]
    fn sections_follow_kind_declaration_order() {
        let doc =
            DocumentBuilder::for_block(ProgramBlockKind::Function, "Scale", 3, "SCL").finish();
        assert_eq!(
            section_names(&doc),
            ["Input", "Output", "InOut", "Temp", "Constant", "Return"]
        );
    }

    #[test]
    fn unknown_section_is_not_reachable() {
        let mut builder =
            DocumentBuilder::for_block(ProgramBlockKind::OrganizationBlock, "Main", 1, "FBD");
        assert!(builder.section_mut(SectionName::Static).is_none());
        assert!(!builder.is_enabled(SectionName::Output));
        assert!(builder.section_mut(SectionName::Temp).is_some());
    }

    #[test]
    fn sections_carry_interface_namespace() {
        let doc = DocumentBuilder::for_block(ProgramBlockKind::FunctionBlock, "Motor", 7, "FBD")
            .finish();
        let xml = doc.to_xml_string(false).expect("xml");
        assert!(xml.contains(&format!("<Sections xmlns=\"{}\">", INTERFACE_NAMESPACE)));
        assert!(xml.starts_with("<?xml"));
    }

    #[test]
    fn type_documents_have_no_object_list() {
        let mut builder = DocumentBuilder::new(ProgramBlockKind::UserDataType, "Recipe");
        builder.open_unnamed_section();
        let doc = builder.finish();
        let block = doc.block_element().expect("block element");
        assert!(block.get_child("ObjectList").is_none());
        assert_eq!(section_names(&doc), ["None"]);
    }

    #[test]
    fn temp_file_holds_document() {
        let doc = DocumentBuilder::for_block(ProgramBlockKind::FunctionBlock, "Motor", 7, "FBD")
            .finish();
        let temp = doc.write_temp().expect("temp file");
        let written = std::fs::read_to_string(temp.path()).expect("read back");
        assert_eq!(written, doc.to_xml_string(false).expect("xml"));
        assert!(temp
            .path()
            .extension()
            .is_some_and(|ext| ext == "xml"));
    }

    #[test]
    fn instance_db_names_its_function_block() {
        let xml = instance_db_xml("Valve_DB", 4, "Valve").expect("xml");
        let root = Element::parse(xml.as_slice()).expect("parse");
        let attributes = root
            .get_child(INSTANCE_DB_ROOT)
            .and_then(|b| b.get_child("AttributeList"))
            .expect("attribute list");
        let text = |name: &str| attributes.get_child(name).and_then(|e| e.get_text()).map(|t| t.into_owned());
        assert_eq!(text("InstanceOfName").as_deref(), Some("Valve"));
        assert_eq!(text("Name").as_deref(), Some("Valve_DB"));
        assert_eq!(text("Number").as_deref(), Some("4"));
    }

    #[test]
    fn file_stems_are_sanitized() {
        assert_eq!(sanitize_file_stem("A/B:C"), "A_B_C");
        assert_eq!(sanitize_file_stem("  "), "block");
    }
}
