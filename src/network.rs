use tracing::debug;
use xmltree::Element;

use crate::access::generate_access;
use crate::document::{element, push_child, text_element, FLGNET_NAMESPACE};
use crate::error::GenerateError;
use crate::model::{CallOption, Instance, NetworkSource, ProgramBlockKind};

/// First identifier handed out inside a network graph.
pub const FIRST_PART_UID: u32 = 21;

/// Identifier of the first compile unit in a block's object list.
pub const FIRST_COMPILE_UNIT_ID: u32 = 3;

/// Each compile unit reserves its own ID plus two multilingual texts
/// with one item each.
pub const COMPILE_UNIT_ID_STRIDE: u32 = 5;

const TEXT_CULTURE: &str = "en-US";

/// Parts and wires of one call instance.
#[derive(Debug, Clone, PartialEq)]
pub struct WireGraph {
    pub parts: Element,
    pub wires: Element,
    pub call_uid: u32,
}

/// Identifier allocation for one call. Value ids live in a table owned by
/// this compilation, indexed like `instance.parameters`.
struct WireGraphCompiler<'a> {
    block: &'a str,
    instance: &'a Instance,
    next_uid: u32,
    value_uids: Vec<Option<u32>>,
}

impl<'a> WireGraphCompiler<'a> {
    fn new(block: &'a str, instance: &'a Instance) -> Self {
        Self {
            block,
            instance,
            next_uid: FIRST_PART_UID,
            value_uids: vec![None; instance.parameters.len()],
        }
    }

    fn new_uid(&mut self) -> u32 {
        let uid = self.next_uid;
        self.next_uid += 1;
        uid
    }

    fn compile(mut self) -> Result<WireGraph, GenerateError> {
        let instance_db = self.instance_database()?;

        let instance = self.instance;
        let mut parts = Element::new("Parts");
        for (index, parameter) in instance.parameters.iter().enumerate() {
            if !parameter.is_bound() {
                continue;
            }
            let uid = self.new_uid();
            if let Some(access) = generate_access(parameter, uid) {
                push_child(&mut parts, access);
                self.value_uids[index] = Some(uid);
            }
        }

        let call_uid = self.next_uid;
        push_child(&mut parts, self.call_element(call_uid, instance_db));
        let wires = self.wires(call_uid);

        debug!(
            block = self.block,
            instance = %self.instance.name,
            call_uid,
            "compiled wire graph"
        );
        Ok(WireGraph {
            parts,
            wires,
            call_uid,
        })
    }

    /// Scope and name of the instance reference, `None` for functions.
    fn instance_database(&self) -> Result<Option<(&'static str, String)>, GenerateError> {
        match self.instance.kind {
            ProgramBlockKind::Function => Ok(None),
            ProgramBlockKind::FunctionBlock => {
                let database = self.instance.database.as_ref().ok_or_else(|| {
                    GenerateError::MissingInstanceDatabase {
                        block: self.block.to_string(),
                        instance: self.instance.name.clone(),
                    }
                })?;
                let scope = match database.call_option {
                    CallOption::Multi => "LocalVariable",
                    CallOption::Single | CallOption::Parameter => "GlobalVariable",
                };
                Ok(Some((scope, database.resolved_name(&self.instance.name))))
            }
            kind => Err(GenerateError::UnsupportedCallKind {
                block: self.block.to_string(),
                instance: self.instance.name.clone(),
                kind,
            }),
        }
    }

    fn call_element(&self, call_uid: u32, instance_db: Option<(&str, String)>) -> Element {
        let mut call = element("Call", &[("UId", call_uid.to_string().as_str())]);
        let mut call_info = element(
            "CallInfo",
            &[
                ("Name", self.instance.name.as_str()),
                ("BlockType", self.instance.kind.block_type()),
            ],
        );

        if let Some((scope, db_name)) = instance_db {
            let mut reference = element(
                "Instance",
                &[("Scope", scope), ("UId", (call_uid + 1).to_string().as_str())],
            );
            push_child(&mut reference, element("Component", &[("Name", db_name.as_str())]));
            push_child(&mut call_info, reference);
        }

        let mut negated = Vec::new();
        for parameter in &self.instance.parameters {
            if parameter.negated {
                negated.push(element("Negated", &[("Name", parameter.name.as_str())]));
            }
            if parameter.is_enable_pin() {
                continue;
            }
            push_child(
                &mut call_info,
                element(
                    "Parameter",
                    &[
                        ("Name", parameter.name.as_str()),
                        ("Section", parameter.section.as_str()),
                        ("Type", parameter.datatype.as_str()),
                    ],
                ),
            );
        }

        push_child(&mut call, call_info);
        for pin in negated {
            push_child(&mut call, pin);
        }
        call
    }

    fn wires(&self, call_uid: u32) -> Element {
        let mut last = call_uid + 2;
        let mut connections = Vec::with_capacity(self.instance.parameters.len());
        for (index, parameter) in self.instance.parameters.iter().enumerate() {
            let name_con = element(
                "NameCon",
                &[
                    ("UId", call_uid.to_string().as_str()),
                    ("Name", parameter.name.as_str()),
                ],
            );
            let source = match self.value_uids[index] {
                Some(value_uid) => element("IdentCon", &[("UId", value_uid.to_string().as_str())]),
                None => {
                    let open = element("OpenCon", &[("UId", last.to_string().as_str())]);
                    last += 1;
                    open
                }
            };
            connections.push((name_con, source));
        }

        let mut wires = Element::new("Wires");
        for (name_con, source) in connections {
            let mut wire = element("Wire", &[("UId", last.to_string().as_str())]);
            push_child(&mut wire, name_con);
            push_child(&mut wire, source);
            push_child(&mut wires, wire);
            last += 1;
        }
        wires
    }
}

/// Compiles the call graph of a single instance.
pub fn compile_wire_graph(block: &str, instance: &Instance) -> Result<WireGraph, GenerateError> {
    WireGraphCompiler::new(block, instance).compile()
}

pub fn compile_unit_id(position: usize) -> u32 {
    FIRST_COMPILE_UNIT_ID + COMPILE_UNIT_ID_STRIDE * position as u32
}

/// Builds the `SW.Blocks.CompileUnit` object for one network source.
pub fn compile_network(
    block: &str,
    language: &str,
    network: &NetworkSource,
    id: u32,
) -> Result<Element, GenerateError> {
    if network.instances.len() > 1 {
        return Err(GenerateError::MultipleInstances {
            block: block.to_string(),
            network: network.title.clone(),
            count: network.instances.len(),
        });
    }

    let mut source = Element::new("NetworkSource");
    if let Some(instance) = network.instances.first() {
        let graph = compile_wire_graph(block, instance)?;
        let mut flg_net = element("FlgNet", &[("xmlns", FLGNET_NAMESPACE)]);
        push_child(&mut flg_net, graph.parts);
        push_child(&mut flg_net, graph.wires);
        push_child(&mut source, flg_net);
    }

    let mut attributes = Element::new("AttributeList");
    push_child(&mut attributes, source);
    push_child(&mut attributes, text_element("ProgrammingLanguage", language));

    let mut objects = Element::new("ObjectList");
    push_child(
        &mut objects,
        multilingual_text(id + 1, "Comment", &network.comment),
    );
    push_child(&mut objects, multilingual_text(id + 3, "Title", &network.title));

    let mut unit = element(
        "SW.Blocks.CompileUnit",
        &[("ID", hex_id(id).as_str()), ("CompositionName", "CompileUnits")],
    );
    push_child(&mut unit, attributes);
    push_child(&mut unit, objects);
    Ok(unit)
}

/// Compile units for every network, numbered in declaration order.
pub fn compile_networks(
    block: &str,
    language: &str,
    networks: &[NetworkSource],
) -> Result<Vec<Element>, GenerateError> {
    networks
        .iter()
        .enumerate()
        .map(|(position, network)| {
            compile_network(block, language, network, compile_unit_id(position))
        })
        .collect()
}

fn multilingual_text(id: u32, composition: &str, text: &str) -> Element {
    let mut item_attributes = Element::new("AttributeList");
    push_child(&mut item_attributes, text_element("Culture", TEXT_CULTURE));
    push_child(&mut item_attributes, text_element("Text", text));

    let mut item = element(
        "MultilingualTextItem",
        &[("ID", hex_id(id + 1).as_str()), ("CompositionName", "Items")],
    );
    push_child(&mut item, item_attributes);

    let mut items = Element::new("ObjectList");
    push_child(&mut items, item);

    let mut multilingual = element(
        "MultilingualText",
        &[("ID", hex_id(id).as_str()), ("CompositionName", composition)],
    );
    push_child(&mut multilingual, items);
    multilingual
}

fn hex_id(id: u32) -> String {
    format!("{:X}", id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::AccessValue;
    use crate::model::{DatabaseRef, WireParameter};

    fn valve(call_option: CallOption) -> Instance {
        Instance {
            name: "Valve".to_string(),
            kind: ProgramBlockKind::FunctionBlock,
            database: Some(DatabaseRef {
                name: "Valve_DB".to_string(),
                call_option,
                number: 1,
                block_group_path: "/".to_string(),
            }),
            parameters: vec![
                WireParameter::enable(Some(AccessValue::parse("Tags.Run"))),
                WireParameter {
                    name: "Speed".to_string(),
                    section: "Input".to_string(),
                    datatype: "Int".to_string(),
                    value: None,
                    negated: false,
                },
            ],
        }
    }

    fn children<'e>(el: &'e Element) -> Vec<&'e Element> {
        el.children.iter().filter_map(|n| n.as_element()).collect()
    }

    fn attr<'e>(el: &'e Element, name: &str) -> &'e str {
        el.attributes.get(name).map(String::as_str).unwrap_or("")
    }

    #[test]
    fn allocates_access_call_instance_then_open_connections() {
        let graph = compile_wire_graph("Motor_Ctrl", &valve(CallOption::Single)).expect("graph");
        let parts = children(&graph.parts);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].name, "Access");
        assert_eq!(attr(parts[0], "UId"), "21");
        assert_eq!(parts[1].name, "Call");
        assert_eq!(attr(parts[1], "UId"), "22");
        assert_eq!(graph.call_uid, 22);

        let call_info = parts[1].get_child("CallInfo").expect("call info");
        assert_eq!(attr(call_info, "BlockType"), "FB");
        let reference = call_info.get_child("Instance").expect("instance");
        assert_eq!(attr(reference, "UId"), "23");
        assert_eq!(attr(reference, "Scope"), "GlobalVariable");
        let params = children(call_info)
            .into_iter()
            .filter(|e| e.name == "Parameter")
            .map(|e| attr(e, "Name"))
            .collect::<Vec<_>>();
        assert_eq!(params, ["Speed"]);

        let wires = children(&graph.wires);
        assert_eq!(wires.len(), 2);
        assert_eq!(attr(wires[0], "UId"), "25");
        assert_eq!(attr(wires[1], "UId"), "26");
        let en = children(wires[0]);
        assert_eq!(attr(en[0], "UId"), "22");
        assert_eq!(attr(en[0], "Name"), "en");
        assert_eq!(en[1].name, "IdentCon");
        assert_eq!(attr(en[1], "UId"), "21");
        let speed = children(wires[1]);
        assert_eq!(speed[1].name, "OpenCon");
        assert_eq!(attr(speed[1], "UId"), "24");
    }

    #[test]
    fn multi_instance_uses_local_scope() {
        let graph = compile_wire_graph("Motor_Ctrl", &valve(CallOption::Multi)).expect("graph");
        let reference = graph
            .parts
            .get_child("Call")
            .and_then(|c| c.get_child("CallInfo"))
            .and_then(|c| c.get_child("Instance"))
            .expect("instance");
        assert_eq!(attr(reference, "Scope"), "LocalVariable");
    }

    #[test]
    fn function_calls_have_no_instance_reference() {
        let mut instance = valve(CallOption::Single);
        instance.kind = ProgramBlockKind::Function;
        instance.database = None;
        instance.parameters[1].negated = true;
        let graph = compile_wire_graph("Main", &instance).expect("graph");
        let call = graph.parts.get_child("Call").expect("call");
        assert!(call
            .get_child("CallInfo")
            .and_then(|c| c.get_child("Instance"))
            .is_none());
        let call_children = children(call);
        assert_eq!(call_children[0].name, "CallInfo");
        assert_eq!(call_children[1].name, "Negated");
        assert_eq!(attr(call_children[1], "Name"), "Speed");
    }

    #[test]
    fn derives_database_name_from_instance() {
        let mut instance = valve(CallOption::Single);
        if let Some(db) = instance.database.as_mut() {
            db.name.clear();
        }
        let graph = compile_wire_graph("Main", &instance).expect("graph");
        let component = graph
            .parts
            .get_child("Call")
            .and_then(|c| c.get_child("CallInfo"))
            .and_then(|c| c.get_child("Instance"))
            .and_then(|i| i.get_child("Component"))
            .expect("component");
        assert_eq!(attr(component, "Name"), "Valve_DB");
    }

    #[test]
    fn rejects_calls_to_data_blocks() {
        let mut instance = valve(CallOption::Single);
        instance.kind = ProgramBlockKind::GlobalDataBlock;
        let err = compile_wire_graph("Main", &instance).unwrap_err();
        assert!(matches!(err, GenerateError::UnsupportedCallKind { .. }));
        assert!(err.is_configuration());
    }

    #[test]
    fn function_block_call_needs_database() {
        let mut instance = valve(CallOption::Single);
        instance.database = None;
        let err = compile_wire_graph("Main", &instance).unwrap_err();
        assert!(matches!(err, GenerateError::MissingInstanceDatabase { .. }));
    }

    #[test]
    fn empty_network_has_no_flgnet() {
        let network = NetworkSource {
            title: "Idle".to_string(),
            comment: String::new(),
            instances: Vec::new(),
        };
        let unit = compile_network("Main", "FBD", &network, 3).expect("unit");
        let source = unit
            .get_child("AttributeList")
            .and_then(|a| a.get_child("NetworkSource"))
            .expect("network source");
        assert!(source.children.is_empty());
    }

    #[test]
    fn multiple_instances_are_rejected() {
        let network = NetworkSource {
            title: "Both".to_string(),
            comment: String::new(),
            instances: vec![valve(CallOption::Single), valve(CallOption::Multi)],
        };
        let err = compile_network("Main", "FBD", &network, 3).unwrap_err();
        assert!(matches!(
            err,
            GenerateError::MultipleInstances { count: 2, .. }
        ));
    }

    #[test]
    fn compile_unit_ids_are_hex_and_strided() {
        assert_eq!(compile_unit_id(0), 3);
        assert_eq!(compile_unit_id(1), 8);
        assert_eq!(compile_unit_id(2), 13);

        let network = NetworkSource {
            title: "Run".to_string(),
            comment: "Starts the valve".to_string(),
            instances: vec![valve(CallOption::Single)],
        };
        let unit = compile_network("Main", "FBD", &network, compile_unit_id(2)).expect("unit");
        assert_eq!(attr(&unit, "ID"), "D");
        assert_eq!(attr(&unit, "CompositionName"), "CompileUnits");

        let texts = children(unit.get_child("ObjectList").expect("objects"));
        assert_eq!(attr(texts[0], "ID"), "E");
        assert_eq!(attr(texts[0], "CompositionName"), "Comment");
        assert_eq!(attr(texts[1], "ID"), "10");
        assert_eq!(attr(texts[1], "CompositionName"), "Title");
        let item = texts[1]
            .get_child("ObjectList")
            .and_then(|o| o.get_child("MultilingualTextItem"))
            .expect("item");
        assert_eq!(attr(item, "ID"), "11");
        let text = item
            .get_child("AttributeList")
            .and_then(|a| a.get_child("Text"))
            .and_then(|t| t.get_text());
        assert_eq!(text.as_deref(), Some("Run"));

        let flg_net = unit
            .get_child("AttributeList")
            .and_then(|a| a.get_child("NetworkSource"))
            .and_then(|s| s.get_child("FlgNet"))
            .expect("flgnet");
        assert_eq!(attr(flg_net, "xmlns"), FLGNET_NAMESPACE);
    }
}
