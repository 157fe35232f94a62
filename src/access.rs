use regex::Regex;
use std::fmt;
use std::sync::OnceLock;
use xmltree::Element;

use crate::document::{element, push_child, text_element};
use crate::model::WireParameter;

/// Datatypes rendered as `LiteralConstant` accesses.
pub const LITERAL_DATATYPES: [&str; 4] = ["Int", "Bool", "UInt", "DInt"];

/// Datatype of the constant inside an array access.
const INDEX_DATATYPE: &str = "DInt";

/// Parsed form of `Root[.Variable[[Index]]]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessValue {
    pub root: String,
    pub variable: Option<String>,
    pub index: Option<String>,
}

impl AccessValue {
    pub fn parse(raw: &str) -> Self {
        let parts = raw.split('.').collect::<Vec<_>>();
        let root = parts[0].to_string();
        if parts.len() != 2 {
            return Self {
                root,
                variable: None,
                index: None,
            };
        }

        let var_part = parts[1];
        match indexed_variable_regex().captures(var_part) {
            Some(caps) => Self {
                root,
                variable: Some(caps["variable"].to_string()),
                index: Some(&caps["index"])
                    .filter(|index| !index.is_empty())
                    .map(str::to_string),
            },
            None => Self {
                root,
                variable: Some(var_part.to_string()),
                index: None,
            },
        }
    }

    /// Empty text means an unbound parameter.
    pub fn parse_optional(raw: &str) -> Option<Self> {
        if raw.is_empty() {
            None
        } else {
            Some(Self::parse(raw))
        }
    }

    pub fn is_symbolic(&self) -> bool {
        self.variable.as_deref().is_some_and(|v| !v.is_empty())
    }
}

impl fmt::Display for AccessValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.root)?;
        if let Some(variable) = &self.variable {
            write!(f, ".{}", variable)?;
        }
        if let Some(index) = &self.index {
            write!(f, "[{}]", index)?;
        }
        Ok(())
    }
}

fn indexed_variable_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<variable>[^\[]*)\[(?P<index>.*)\]$").expect("static pattern compiles")
    })
}

/// The three access shapes a bound parameter can take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessNode<'a> {
    GlobalVariable {
        root: &'a str,
        variable: &'a str,
        index: Option<&'a str>,
    },
    LiteralConstant {
        datatype: &'a str,
        value: &'a str,
    },
    TypedConstant {
        value: &'a str,
    },
}

impl<'a> AccessNode<'a> {
    pub fn classify(datatype: &'a str, value: &'a AccessValue) -> Self {
        match value.variable.as_deref() {
            Some(variable) if !variable.is_empty() => AccessNode::GlobalVariable {
                root: &value.root,
                variable,
                index: value.index.as_deref(),
            },
            _ if LITERAL_DATATYPES.contains(&datatype) => AccessNode::LiteralConstant {
                datatype,
                value: &value.root,
            },
            _ => AccessNode::TypedConstant { value: &value.root },
        }
    }

    pub fn scope(&self) -> &'static str {
        match self {
            AccessNode::GlobalVariable { .. } => "GlobalVariable",
            AccessNode::LiteralConstant { .. } => "LiteralConstant",
            AccessNode::TypedConstant { .. } => "TypedConstant",
        }
    }

    /// Renders the node; nested accesses pass `None` and carry no `UId`.
    pub fn render(&self, uid: Option<u32>) -> Element {
        let mut access = element("Access", &[("Scope", self.scope())]);
        if let Some(uid) = uid {
            access
                .attributes
                .insert("UId".to_string(), uid.to_string());
        }

        match *self {
            AccessNode::GlobalVariable {
                root,
                variable,
                index,
            } => {
                let mut symbol = Element::new("Symbol");
                push_child(&mut symbol, element("Component", &[("Name", root)]));
                push_child(&mut symbol, element("Component", &[("Name", variable)]));
                if let Some(index) = index {
                    let mut array = element(
                        "Component",
                        &[("Name", variable), ("AccessModifier", "Array")],
                    );
                    let index_access = AccessNode::LiteralConstant {
                        datatype: INDEX_DATATYPE,
                        value: index,
                    };
                    push_child(&mut array, index_access.render(None));
                    push_child(&mut symbol, array);
                }
                push_child(&mut access, symbol);
            }
            AccessNode::LiteralConstant { datatype, value } => {
                let mut constant = Element::new("Constant");
                push_child(&mut constant, text_element("ConstantType", datatype));
                push_child(&mut constant, text_element("ConstantValue", value));
                push_child(&mut access, constant);
            }
            AccessNode::TypedConstant { value } => {
                let mut constant = Element::new("Constant");
                push_child(&mut constant, text_element("ConstantValue", value));
                push_child(&mut access, constant);
            }
        }
        access
    }
}

/// Access node for a bound parameter, or `None` when it is unbound.
pub fn generate_access(parameter: &WireParameter, uid: u32) -> Option<Element> {
    let value = parameter.value.as_ref()?;
    Some(AccessNode::classify(&parameter.datatype, value).render(Some(uid)))
}
