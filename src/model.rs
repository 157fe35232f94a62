use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::access::AccessValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProgramBlockKind {
    #[serde(alias = "OB", alias = "SW.Blocks.OB")]
    OrganizationBlock,
    #[serde(alias = "FB", alias = "SW.Blocks.FB")]
    FunctionBlock,
    #[serde(alias = "FC", alias = "SW.Blocks.FC")]
    Function,
    #[serde(alias = "GlobalDB", alias = "SW.Blocks.GlobalDB")]
    GlobalDataBlock,
    #[serde(alias = "PlcStruct", alias = "SW.Types.PlcStruct")]
    UserDataType,
}

impl ProgramBlockKind {
    /// Root element name of the import document.
    pub fn document_root(self) -> &'static str {
        match self {
            ProgramBlockKind::OrganizationBlock => "SW.Blocks.OB",
            ProgramBlockKind::FunctionBlock => "SW.Blocks.FB",
            ProgramBlockKind::Function => "SW.Blocks.FC",
            ProgramBlockKind::GlobalDataBlock => "SW.Blocks.GlobalDB",
            ProgramBlockKind::UserDataType => "SW.Types.PlcStruct",
        }
    }

    /// Short block type used by `CallInfo`.
    pub fn block_type(self) -> &'static str {
        match self {
            ProgramBlockKind::OrganizationBlock => "OB",
            ProgramBlockKind::FunctionBlock => "FB",
            ProgramBlockKind::Function => "FC",
            ProgramBlockKind::GlobalDataBlock => "GlobalDB",
            ProgramBlockKind::UserDataType => "PlcStruct",
        }
    }

    /// Sections this kind declares, in document order.
    pub fn enabled_sections(self) -> &'static [SectionName] {
        use SectionName::*;
        match self {
            ProgramBlockKind::OrganizationBlock => &[Input, Temp, Constant],
            ProgramBlockKind::FunctionBlock => &[Input, Output, InOut, Static, Temp, Constant],
            ProgramBlockKind::Function => &[Input, Output, InOut, Temp, Constant, Return],
            ProgramBlockKind::GlobalDataBlock => &[Static],
            ProgramBlockKind::UserDataType => &[],
        }
    }

    pub fn has_retain_semantics(self) -> bool {
        matches!(self, ProgramBlockKind::GlobalDataBlock)
    }

    pub fn has_networks(self) -> bool {
        matches!(
            self,
            ProgramBlockKind::OrganizationBlock
                | ProgramBlockKind::FunctionBlock
                | ProgramBlockKind::Function
        )
    }
}

impl std::fmt::Display for ProgramBlockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ProgramBlockKind::OrganizationBlock => "organization block",
            ProgramBlockKind::FunctionBlock => "function block",
            ProgramBlockKind::Function => "function",
            ProgramBlockKind::GlobalDataBlock => "global data block",
            ProgramBlockKind::UserDataType => "user data type",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SectionName {
    Input,
    Output,
    InOut,
    Static,
    Temp,
    Constant,
    Return,
}

impl SectionName {
    pub fn as_str(self) -> &'static str {
        match self {
            SectionName::Input => "Input",
            SectionName::Output => "Output",
            SectionName::InOut => "InOut",
            SectionName::Static => "Static",
            SectionName::Temp => "Temp",
            SectionName::Constant => "Constant",
            SectionName::Return => "Return",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableStruct {
    pub name: String,
    pub datatype: String,
    #[serde(default = "default_true")]
    pub retain: bool,
    #[serde(default)]
    pub start_value: String,
    #[serde(default)]
    pub attributes: IndexMap<String, bool>,
}

impl VariableStruct {
    pub fn new(name: impl Into<String>, datatype: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            datatype: datatype.into(),
            retain: true,
            start_value: String::new(),
            attributes: IndexMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableSection {
    pub name: SectionName,
    #[serde(default)]
    pub members: Vec<VariableStruct>,
}

/// Field of a user data type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructField {
    pub name: String,
    pub datatype: String,
    #[serde(default)]
    pub attributes: IndexMap<String, bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CallOption {
    #[default]
    Single,
    Multi,
    Parameter,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseRef {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub call_option: CallOption,
    #[serde(default = "default_number")]
    pub number: u32,
    #[serde(default = "default_group_path")]
    pub block_group_path: String,
}

impl DatabaseRef {
    /// Instance DB name, derived from the calling instance when left empty.
    pub fn resolved_name(&self, instance_name: &str) -> String {
        if self.name.is_empty() {
            format!("{}_DB", instance_name)
        } else {
            self.name.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireParameter {
    pub name: String,
    #[serde(default)]
    pub section: String,
    pub datatype: String,
    #[serde(
        default,
        deserialize_with = "deserialize_access_value",
        serialize_with = "serialize_access_value"
    )]
    pub value: Option<AccessValue>,
    #[serde(default)]
    pub negated: bool,
}

impl WireParameter {
    pub const ENABLE_PIN: &'static str = "en";

    /// The implicit enable pin every call exposes.
    pub fn enable(value: Option<AccessValue>) -> Self {
        Self {
            name: Self::ENABLE_PIN.to_string(),
            section: String::new(),
            datatype: "Bool".to_string(),
            value,
            negated: false,
        }
    }

    pub fn is_enable_pin(&self) -> bool {
        self.name == Self::ENABLE_PIN
    }

    pub fn is_bound(&self) -> bool {
        self.value.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub name: String,
    pub kind: ProgramBlockKind,
    #[serde(default)]
    pub database: Option<DatabaseRef>,
    #[serde(default)]
    pub parameters: Vec<WireParameter>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NetworkSource {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub instances: Vec<Instance>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EventClass {
    #[default]
    ProgramCycle,
    Startup,
}

impl EventClass {
    pub fn as_str(self) -> &'static str {
        match self {
            EventClass::ProgramCycle => "ProgramCycle",
            EventClass::Startup => "Startup",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryData {
    pub library_name: String,
    #[serde(default = "default_group_path")]
    pub master_copy_folder_path: String,
}

/// Data only one block kind carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BlockDetails {
    #[serde(alias = "OB")]
    OrganizationBlock {
        #[serde(default)]
        event_class: EventClass,
    },
    #[serde(alias = "FB")]
    FunctionBlock,
    #[serde(alias = "FC")]
    Function,
    #[serde(alias = "GlobalDB")]
    GlobalDataBlock {
        #[serde(default)]
        attributes: IndexMap<String, String>,
    },
    #[serde(alias = "PlcStruct")]
    UserDataType {
        #[serde(default)]
        fields: Vec<StructField>,
    },
}

impl BlockDetails {
    pub fn kind(&self) -> ProgramBlockKind {
        match self {
            BlockDetails::OrganizationBlock { .. } => ProgramBlockKind::OrganizationBlock,
            BlockDetails::FunctionBlock => ProgramBlockKind::FunctionBlock,
            BlockDetails::Function => ProgramBlockKind::Function,
            BlockDetails::GlobalDataBlock { .. } => ProgramBlockKind::GlobalDataBlock,
            BlockDetails::UserDataType { .. } => ProgramBlockKind::UserDataType,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramBlock {
    #[serde(flatten)]
    pub details: BlockDetails,
    pub name: String,
    #[serde(default = "default_number")]
    pub number: u32,
    #[serde(default = "default_language")]
    pub programming_language: String,
    #[serde(default)]
    pub sections: Vec<VariableSection>,
    #[serde(default)]
    pub networks: Vec<NetworkSource>,
    #[serde(default = "default_group_path")]
    pub block_group_path: String,
    #[serde(default)]
    pub is_instance: bool,
    #[serde(default)]
    pub library: Option<LibraryData>,
}

impl ProgramBlock {
    pub fn new(details: BlockDetails, name: impl Into<String>, number: u32) -> Self {
        Self {
            details,
            name: name.into(),
            number,
            programming_language: default_language(),
            sections: Vec::new(),
            networks: Vec::new(),
            block_group_path: default_group_path(),
            is_instance: false,
            library: None,
        }
    }

    pub fn kind(&self) -> ProgramBlockKind {
        self.details.kind()
    }
}

fn default_true() -> bool {
    true
}

fn default_number() -> u32 {
    1
}

fn default_language() -> String {
    "FBD".to_string()
}

fn default_group_path() -> String {
    "/".to_string()
}

fn deserialize_access_value<'de, D>(deserializer: D) -> Result<Option<AccessValue>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(AccessValue::parse_optional))
}

fn serialize_access_value<S>(value: &Option<AccessValue>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(value) => serializer.collect_str(value),
        None => serializer.serialize_str(""),
    }
}
