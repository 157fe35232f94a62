use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use indexmap::IndexMap;
use tracing::debug;

use crate::blockgroup::{find_block_group, path_segments, BlockGroupTree};
use crate::document::{instance_db_xml, sanitize_file_stem};

/// Conflict handling when a block with the same name already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImportOptions {
    #[default]
    None,
    Override,
}

/// Target project the generated documents are imported into.
pub trait ProjectSession: BlockGroupTree {
    fn import_block(
        &mut self,
        group: &Self::Group,
        block_name: &str,
        xml_file: &Path,
        options: ImportOptions,
    ) -> Result<()>;

    fn contains_block(&self, group: &Self::Group, block_name: &str) -> Result<bool>;

    /// Imports a data type document into the project's type group.
    fn import_type(&mut self, type_name: &str, xml_file: &Path, options: ImportOptions)
        -> Result<()>;

    /// Creates the instance data block `name` of function block `instance_of`.
    fn create_instance_db(
        &mut self,
        group: &Self::Group,
        name: &str,
        number: u32,
        instance_of: &str,
    ) -> Result<()>;
}

/// Library of master copies that can be instantiated into a session.
pub trait LibraryCatalog<S: ProjectSession + ?Sized> {
    type Library;
    type MasterCopy;

    fn find_library(&self, name: &str) -> Result<Option<Self::Library>>;

    fn find_master_copy(
        &self,
        library: &Self::Library,
        folder_path: &str,
        name: &str,
    ) -> Result<Option<Self::MasterCopy>>;

    fn copy_into(
        &self,
        master: &Self::MasterCopy,
        session: &mut S,
        group: &S::Group,
    ) -> Result<()>;
}

/// Group holding `block_name` under `path`, when both exist.
pub fn find_block<S>(session: &S, path: &str, block_name: &str) -> Result<Option<S::Group>>
where
    S: ProjectSession + ?Sized,
{
    if block_name.is_empty() {
        return Ok(None);
    }
    let Some(group) = find_block_group(session, path)? else {
        return Ok(None);
    };
    if session.contains_block(&group, block_name)? {
        Ok(Some(group))
    } else {
        Ok(None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockOrigin {
    Imported,
    MasterCopy { library: String, folder: String },
    InstanceDb { instance_of: String, number: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlock {
    pub name: String,
    pub xml: String,
    pub origin: BlockOrigin,
}

#[derive(Debug, Clone)]
struct GroupNode {
    name: String,
    parent: Option<GroupId>,
    children: Vec<GroupId>,
    blocks: IndexMap<String, StoredBlock>,
}

/// Project held in memory; groups live in an arena indexed by `GroupId`.
#[derive(Debug, Clone)]
pub struct MemoryProject {
    groups: Vec<GroupNode>,
    types: IndexMap<String, StoredBlock>,
}

impl Default for MemoryProject {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProject {
    pub fn new() -> Self {
        Self {
            groups: vec![GroupNode {
                name: String::new(),
                parent: None,
                children: Vec::new(),
                blocks: IndexMap::new(),
            }],
            types: IndexMap::new(),
        }
    }

    fn node(&self, id: GroupId) -> Result<&GroupNode> {
        self.groups
            .get(id.0)
            .ok_or_else(|| anyhow!("unknown block group id {}", id.0))
    }

    fn node_mut(&mut self, id: GroupId) -> Result<&mut GroupNode> {
        self.groups
            .get_mut(id.0)
            .ok_or_else(|| anyhow!("unknown block group id {}", id.0))
    }

    pub fn group_path(&self, id: GroupId) -> String {
        let mut names = Vec::new();
        let mut cursor = self.groups.get(id.0);
        while let Some(node) = cursor {
            if node.parent.is_none() {
                break;
            }
            names.push(node.name.as_str());
            cursor = node.parent.and_then(|parent| self.groups.get(parent.0));
        }
        names.reverse();
        format!("/{}", names.join("/"))
    }

    /// Every group path in creation order.
    pub fn group_paths(&self) -> Vec<String> {
        (0..self.groups.len())
            .map(|index| self.group_path(GroupId(index)))
            .collect()
    }

    pub fn blocks(&self, id: GroupId) -> impl Iterator<Item = &StoredBlock> {
        self.groups
            .get(id.0)
            .into_iter()
            .flat_map(|node| node.blocks.values())
    }

    pub fn block(&self, path: &str, name: &str) -> Option<&StoredBlock> {
        let group = find_block_group(self, path).ok().flatten()?;
        self.groups.get(group.0)?.blocks.get(name)
    }

    pub fn plc_type(&self, name: &str) -> Option<&StoredBlock> {
        self.types.get(name)
    }

    pub fn plc_types(&self) -> impl Iterator<Item = &StoredBlock> {
        self.types.values()
    }

    /// Stores `block` in `group`, replacing a same-named block only when
    /// `options` allows it.
    pub fn store_block(
        &mut self,
        group: GroupId,
        block: StoredBlock,
        options: ImportOptions,
    ) -> Result<()> {
        let node = self.node_mut(group)?;
        if options == ImportOptions::None && node.blocks.contains_key(&block.name) {
            bail!("block '{}' already exists", block.name);
        }
        node.blocks.insert(block.name.clone(), block);
        Ok(())
    }
}

impl BlockGroupTree for MemoryProject {
    type Group = GroupId;

    fn root_group(&self) -> GroupId {
        GroupId(0)
    }

    fn find_group(&self, parent: &GroupId, name: &str) -> Result<Option<GroupId>> {
        let node = self.node(*parent)?;
        Ok(node
            .children
            .iter()
            .copied()
            .find(|child| self.groups[child.0].name == name))
    }

    fn create_group(&mut self, parent: &GroupId, name: &str) -> Result<GroupId> {
        let id = GroupId(self.groups.len());
        self.node_mut(*parent)?.children.push(id);
        self.groups.push(GroupNode {
            name: name.to_string(),
            parent: Some(*parent),
            children: Vec::new(),
            blocks: IndexMap::new(),
        });
        Ok(id)
    }
}

impl ProjectSession for MemoryProject {
    fn import_block(
        &mut self,
        group: &GroupId,
        block_name: &str,
        xml_file: &Path,
        options: ImportOptions,
    ) -> Result<()> {
        let xml = fs::read_to_string(xml_file)
            .with_context(|| format!("failed to read {}", xml_file.display()))?;
        self.store_block(
            *group,
            StoredBlock {
                name: block_name.to_string(),
                xml,
                origin: BlockOrigin::Imported,
            },
            options,
        )
    }

    fn contains_block(&self, group: &GroupId, block_name: &str) -> Result<bool> {
        Ok(self.node(*group)?.blocks.contains_key(block_name))
    }

    fn import_type(
        &mut self,
        type_name: &str,
        xml_file: &Path,
        options: ImportOptions,
    ) -> Result<()> {
        if options == ImportOptions::None && self.types.contains_key(type_name) {
            bail!("data type '{}' already exists", type_name);
        }
        let xml = fs::read_to_string(xml_file)
            .with_context(|| format!("failed to read {}", xml_file.display()))?;
        self.types.insert(
            type_name.to_string(),
            StoredBlock {
                name: type_name.to_string(),
                xml,
                origin: BlockOrigin::Imported,
            },
        );
        Ok(())
    }

    fn create_instance_db(
        &mut self,
        group: &GroupId,
        name: &str,
        number: u32,
        instance_of: &str,
    ) -> Result<()> {
        let xml = String::from_utf8(instance_db_xml(name, number, instance_of)?)?;
        self.store_block(
            *group,
            StoredBlock {
                name: name.to_string(),
                xml,
                origin: BlockOrigin::InstanceDb {
                    instance_of: instance_of.to_string(),
                    number,
                },
            },
            ImportOptions::None,
        )
    }
}

/// In-memory master copies keyed by library, folder and name.
#[derive(Debug, Clone, Default)]
pub struct MemoryLibrary {
    libraries: IndexMap<String, IndexMap<(String, String), String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryMasterCopy {
    pub library: String,
    pub folder: String,
    pub name: String,
    pub xml: String,
}

impl MemoryLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_master_copy(&mut self, library: &str, folder_path: &str, name: &str, xml: &str) {
        self.libraries
            .entry(library.to_string())
            .or_default()
            .insert((normalize_folder(folder_path), name.to_string()), xml.to_string());
    }
}

impl LibraryCatalog<MemoryProject> for MemoryLibrary {
    type Library = String;
    type MasterCopy = MemoryMasterCopy;

    fn find_library(&self, name: &str) -> Result<Option<String>> {
        Ok(self.libraries.contains_key(name).then(|| name.to_string()))
    }

    fn find_master_copy(
        &self,
        library: &String,
        folder_path: &str,
        name: &str,
    ) -> Result<Option<MemoryMasterCopy>> {
        let folder = normalize_folder(folder_path);
        Ok(self
            .libraries
            .get(library)
            .and_then(|copies| copies.get(&(folder.clone(), name.to_string())))
            .map(|xml| MemoryMasterCopy {
                library: library.clone(),
                folder,
                name: name.to_string(),
                xml: xml.clone(),
            }))
    }

    fn copy_into(
        &self,
        master: &MemoryMasterCopy,
        session: &mut MemoryProject,
        group: &GroupId,
    ) -> Result<()> {
        session.store_block(
            *group,
            StoredBlock {
                name: master.name.clone(),
                xml: master.xml.clone(),
                origin: BlockOrigin::MasterCopy {
                    library: master.library.clone(),
                    folder: master.folder.clone(),
                },
            },
            ImportOptions::Override,
        )
    }
}

fn normalize_folder(folder_path: &str) -> String {
    format!("/{}", path_segments(folder_path).collect::<Vec<_>>().join("/"))
}

const PROGRAM_BLOCKS_DIR: &str = "Program blocks";
const DATA_TYPES_DIR: &str = "PLC data types";

/// Single directory name taken from a group path or library folder.
fn checked_dir_name(name: &str) -> Result<&str> {
    let single_normal = matches!(
        Path::new(name).components().collect::<Vec<_>>().as_slice(),
        [Component::Normal(_)]
    );
    if !single_normal || name.contains(['/', '\\']) || name == "." || name == ".." {
        bail!("invalid group name '{}'", name);
    }
    Ok(name)
}

/// Project laid out on disk. Block groups are directories under
/// `<root>/Program blocks` and each imported block is stored as
/// `<group>/<block>.xml`; data types go to `<root>/PLC data types`.
#[derive(Debug, Clone)]
pub struct DirectoryProject {
    root: PathBuf,
    blocks_root: PathBuf,
    types_root: PathBuf,
}

impl DirectoryProject {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let blocks_root = root.join(PROGRAM_BLOCKS_DIR);
        let types_root = root.join(DATA_TYPES_DIR);
        for dir in [&blocks_root, &types_root] {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create project directory {}", dir.display()))?;
        }
        Ok(Self {
            root,
            blocks_root,
            types_root,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn blocks_root(&self) -> &Path {
        &self.blocks_root
    }

    pub fn types_root(&self) -> &Path {
        &self.types_root
    }

    pub fn block_path(group: &Path, block_name: &str) -> PathBuf {
        group.join(format!("{}.xml", sanitize_file_stem(block_name)))
    }
}

impl BlockGroupTree for DirectoryProject {
    type Group = PathBuf;

    fn root_group(&self) -> PathBuf {
        self.blocks_root.clone()
    }

    fn find_group(&self, parent: &PathBuf, name: &str) -> Result<Option<PathBuf>> {
        let candidate = parent.join(checked_dir_name(name)?);
        Ok(candidate.is_dir().then_some(candidate))
    }

    fn create_group(&mut self, parent: &PathBuf, name: &str) -> Result<PathBuf> {
        let group = parent.join(checked_dir_name(name)?);
        fs::create_dir(&group)
            .with_context(|| format!("failed to create block group {}", group.display()))?;
        Ok(group)
    }
}

impl ProjectSession for DirectoryProject {
    fn import_block(
        &mut self,
        group: &PathBuf,
        block_name: &str,
        xml_file: &Path,
        options: ImportOptions,
    ) -> Result<()> {
        let target = Self::block_path(group, block_name);
        if options == ImportOptions::None && target.exists() {
            bail!("block '{}' already exists at {}", block_name, target.display());
        }
        fs::copy(xml_file, &target).with_context(|| {
            format!(
                "failed to import {} into {}",
                xml_file.display(),
                target.display()
            )
        })?;
        debug!(block = block_name, target = %target.display(), "imported block");
        Ok(())
    }

    fn contains_block(&self, group: &PathBuf, block_name: &str) -> Result<bool> {
        Ok(Self::block_path(group, block_name).is_file())
    }

    fn import_type(
        &mut self,
        type_name: &str,
        xml_file: &Path,
        options: ImportOptions,
    ) -> Result<()> {
        let target = Self::block_path(&self.types_root, type_name);
        if options == ImportOptions::None && target.exists() {
            bail!("data type '{}' already exists at {}", type_name, target.display());
        }
        fs::copy(xml_file, &target).with_context(|| {
            format!(
                "failed to import {} into {}",
                xml_file.display(),
                target.display()
            )
        })?;
        debug!(data_type = type_name, target = %target.display(), "imported data type");
        Ok(())
    }

    fn create_instance_db(
        &mut self,
        group: &PathBuf,
        name: &str,
        number: u32,
        instance_of: &str,
    ) -> Result<()> {
        let target = Self::block_path(group, name);
        if target.exists() {
            bail!("block '{}' already exists at {}", name, target.display());
        }
        fs::write(&target, instance_db_xml(name, number, instance_of)?)
            .with_context(|| format!("failed to write {}", target.display()))?;
        debug!(block = name, instance_of, target = %target.display(), "created instance DB");
        Ok(())
    }
}

/// Libraries on disk: `<root>/<library>/<folder path>/<name>.xml`.
#[derive(Debug, Clone)]
pub struct DirectoryLibrary {
    root: PathBuf,
}

impl DirectoryLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl LibraryCatalog<DirectoryProject> for DirectoryLibrary {
    type Library = PathBuf;
    type MasterCopy = PathBuf;

    fn find_library(&self, name: &str) -> Result<Option<PathBuf>> {
        let library = self.root.join(checked_dir_name(name)?);
        Ok(library.is_dir().then_some(library))
    }

    fn find_master_copy(
        &self,
        library: &PathBuf,
        folder_path: &str,
        name: &str,
    ) -> Result<Option<PathBuf>> {
        let mut folder = library.clone();
        for segment in path_segments(folder_path) {
            folder.push(checked_dir_name(segment)?);
        }
        let master = DirectoryProject::block_path(&folder, name);
        Ok(master.is_file().then_some(master))
    }

    fn copy_into(
        &self,
        master: &PathBuf,
        _session: &mut DirectoryProject,
        group: &PathBuf,
    ) -> Result<()> {
        let file_name = master
            .file_name()
            .ok_or_else(|| anyhow!("master copy path {} has no file name", master.display()))?;
        let target = group.join(file_name);
        fs::copy(master, &target).with_context(|| {
            format!(
                "failed to copy master copy {} into {}",
                master.display(),
                target.display()
            )
        })?;
        debug!(master = %master.display(), target = %target.display(), "copied master copy");
        Ok(())
    }
}
