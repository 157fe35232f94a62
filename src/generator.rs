use std::path::Path;
use std::thread;

use tracing::{debug, info};

use crate::blockgroup::{ensure_block_group, locate_block_group};
use crate::blocks::build_document;
use crate::document::BlockDocument;
use crate::error::GenerateError;
use crate::model::{BlockDetails, CallOption, ProgramBlock, ProgramBlockKind};
use crate::project::{ImportOptions, LibraryCatalog, ProjectSession};

type GenerateProgressCallback<'a> = dyn FnMut(usize, usize, &str) + 'a;

/// What synthesis produced for one block.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockArtifact {
    Document(BlockDocument),
    /// Placed by copying a library master copy; nothing to render.
    LibraryInstance,
    /// Data type without fields; never imported.
    Skipped,
}

/// How a block ended up in the project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Imported,
    ImportedType,
    CopiedFromLibrary,
    InstanceDatabase,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedBlock {
    pub name: String,
    pub placement: Placement,
}

/// Renders the import document of a block that is not a library instance.
pub fn build_block_xml(block: &ProgramBlock) -> Result<BlockDocument, GenerateError> {
    build_document(block)
}

/// Renders a block and writes its document to `path`.
pub fn write_block_xml(block: &ProgramBlock, path: &Path, pretty: bool) -> Result<(), GenerateError> {
    let document = build_block_xml(block)?;
    document.write_to(path, pretty)?;
    debug!(block = %block.name, path = %path.display(), "wrote block document");
    Ok(())
}

pub fn synthesize(block: &ProgramBlock) -> Result<BlockArtifact, GenerateError> {
    if block.is_instance {
        check_library_instance(block)?;
        return Ok(BlockArtifact::LibraryInstance);
    }
    if let BlockDetails::UserDataType { fields } = &block.details {
        if fields.is_empty() {
            debug!(block = %block.name, "data type has no fields, skipping");
            return Ok(BlockArtifact::Skipped);
        }
    }
    build_block_xml(block).map(BlockArtifact::Document)
}

/// Synthesizes every block on scoped worker threads. Results keep the
/// input order.
pub fn synthesize_all(blocks: &[ProgramBlock]) -> Vec<Result<BlockArtifact, GenerateError>> {
    if blocks.len() < 2 {
        return blocks.iter().map(synthesize).collect();
    }
    let workers = thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(blocks.len());
    let chunk_size = blocks.len().div_ceil(workers);

    thread::scope(|scope| {
        let handles = blocks
            .chunks(chunk_size)
            .map(|chunk| scope.spawn(move || chunk.iter().map(synthesize).collect::<Vec<_>>()))
            .collect::<Vec<_>>();
        handles
            .into_iter()
            .flat_map(|handle| match handle.join() {
                Ok(results) => results,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    })
}

fn check_library_instance(block: &ProgramBlock) -> Result<(), GenerateError> {
    let kind = block.kind();
    if !kind.has_networks() {
        return Err(GenerateError::LibraryInstanceNotSupported {
            block: block.name.clone(),
            kind,
        });
    }
    if block.library.is_none() {
        return Err(GenerateError::MissingLibraryData {
            block: block.name.clone(),
        });
    }
    Ok(())
}

/// Imports a rendered document into the block group at `group_path`,
/// creating missing groups.
pub fn place_document<S>(
    session: &mut S,
    document: &BlockDocument,
    group_path: &str,
) -> Result<(), GenerateError>
where
    S: ProjectSession + ?Sized,
{
    import_document(session, document, group_path, true)
}

/// Like [`place_document`], but only into a group that already exists.
pub fn place_document_in_existing_group<S>(
    session: &mut S,
    document: &BlockDocument,
    group_path: &str,
) -> Result<(), GenerateError>
where
    S: ProjectSession + ?Sized,
{
    import_document(session, document, group_path, false)
}

/// The temporary file lives until the import returns.
fn import_document<S>(
    session: &mut S,
    document: &BlockDocument,
    group_path: &str,
    create_groups: bool,
) -> Result<(), GenerateError>
where
    S: ProjectSession + ?Sized,
{
    let name = document.name();
    let group = locate_block_group(session, group_path, create_groups)
        .map_err(|err| GenerateError::placement(name, err))?
        .ok_or_else(|| GenerateError::BlockGroupNotFound(group_path.to_string()))?;

    let temp = document.write_temp()?;
    debug!(block = name, path = %temp.path().display(), "wrote temporary document");
    session
        .import_block(&group, name, temp.path(), ImportOptions::Override)
        .map_err(|err| GenerateError::placement(name, err))?;
    info!(block = name, group = group_path, "imported block");
    Ok(())
}

/// Imports a data type document into the project's type group.
pub fn place_type<S>(session: &mut S, document: &BlockDocument) -> Result<(), GenerateError>
where
    S: ProjectSession + ?Sized,
{
    let name = document.name();
    let temp = document.write_temp()?;
    session
        .import_type(name, temp.path(), ImportOptions::Override)
        .map_err(|err| GenerateError::placement(name, err))?;
    info!(data_type = name, "imported data type");
    Ok(())
}

/// Copies the master copy named like `block` from its library.
pub fn place_library_instance<S, L>(
    session: &mut S,
    catalog: &L,
    block: &ProgramBlock,
) -> Result<(), GenerateError>
where
    S: ProjectSession + ?Sized,
    L: LibraryCatalog<S> + ?Sized,
{
    check_library_instance(block)?;
    let Some(data) = block.library.as_ref() else {
        return Err(GenerateError::MissingLibraryData {
            block: block.name.clone(),
        });
    };
    debug!(
        block = %block.name,
        library = %data.library_name,
        folder = %data.master_copy_folder_path,
        "looking up master copy"
    );

    let library = catalog
        .find_library(&data.library_name)
        .map_err(|err| GenerateError::placement(&block.name, err))?
        .ok_or_else(|| GenerateError::LibraryNotFound(data.library_name.clone()))?;
    let master = catalog
        .find_master_copy(&library, &data.master_copy_folder_path, &block.name)
        .map_err(|err| GenerateError::placement(&block.name, err))?
        .ok_or_else(|| GenerateError::MasterCopyNotFound {
            library: data.library_name.clone(),
            folder: data.master_copy_folder_path.clone(),
            name: block.name.clone(),
        })?;

    let group = ensure_block_group(session, &block.block_group_path)
        .map_err(|err| GenerateError::placement(&block.name, err))?;
    catalog
        .copy_into(&master, session, &group)
        .map_err(|err| GenerateError::placement(&block.name, err))?;
    info!(
        block = %block.name,
        library = %data.library_name,
        group = %block.block_group_path,
        "copied master copy"
    );
    Ok(())
}

/// Synthesizes and places a single block.
pub fn place_block<S, L>(
    session: &mut S,
    catalog: &L,
    block: &ProgramBlock,
) -> Result<Placement, GenerateError>
where
    S: ProjectSession + ?Sized,
    L: LibraryCatalog<S> + ?Sized,
{
    let artifact = synthesize(block)?;
    place_artifact(session, catalog, block, &artifact)
}

fn place_artifact<S, L>(
    session: &mut S,
    catalog: &L,
    block: &ProgramBlock,
    artifact: &BlockArtifact,
) -> Result<Placement, GenerateError>
where
    S: ProjectSession + ?Sized,
    L: LibraryCatalog<S> + ?Sized,
{
    match artifact {
        BlockArtifact::Document(document) if document.kind() == ProgramBlockKind::UserDataType => {
            place_type(session, document)?;
            Ok(Placement::ImportedType)
        }
        BlockArtifact::Document(document) => {
            place_document(session, document, &block.block_group_path)?;
            Ok(Placement::Imported)
        }
        BlockArtifact::LibraryInstance => {
            place_library_instance(session, catalog, block)?;
            Ok(Placement::CopiedFromLibrary)
        }
        BlockArtifact::Skipped => Ok(Placement::Skipped),
    }
}

/// Creates the instance data blocks of single-instance FB calls made by
/// `blocks`. Blocks that already exist under the target name are kept.
pub fn create_instance_dbs<S>(
    session: &mut S,
    blocks: &[ProgramBlock],
) -> Result<Vec<PlacedBlock>, GenerateError>
where
    S: ProjectSession + ?Sized,
{
    let calls = blocks
        .iter()
        .flat_map(|block| &block.networks)
        .flat_map(|network| &network.instances);

    let mut created = Vec::new();
    for instance in calls {
        if instance.kind != ProgramBlockKind::FunctionBlock || instance.name.is_empty() {
            continue;
        }
        let Some(db) = instance.database.as_ref() else {
            continue;
        };
        if db.call_option != CallOption::Single {
            continue;
        }
        let name = db.resolved_name(&instance.name);
        let group = ensure_block_group(session, &db.block_group_path)
            .map_err(|err| GenerateError::placement(&name, err))?;
        if session
            .contains_block(&group, &name)
            .map_err(|err| GenerateError::placement(&name, err))?
        {
            debug!(block = %name, "instance DB already present");
            continue;
        }
        session
            .create_instance_db(&group, &name, db.number, &instance.name)
            .map_err(|err| GenerateError::placement(&name, err))?;
        info!(
            block = %name,
            instance_of = %instance.name,
            group = %db.block_group_path,
            "created instance DB"
        );
        created.push(PlacedBlock {
            name,
            placement: Placement::InstanceDatabase,
        });
    }
    Ok(created)
}

pub fn generate_all<S, L>(
    session: &mut S,
    catalog: &L,
    blocks: &[ProgramBlock],
) -> Result<Vec<PlacedBlock>, GenerateError>
where
    S: ProjectSession + ?Sized,
    L: LibraryCatalog<S> + ?Sized,
{
    generate_all_with_progress(
        session,
        catalog,
        blocks,
        Option::<&mut fn(usize, usize, &str)>::None,
    )
}

/// Synthesizes all blocks in parallel, then places them one at a time in
/// input order. A synthesis error aborts before anything is placed.
pub fn generate_all_with_progress<S, L, F>(
    session: &mut S,
    catalog: &L,
    blocks: &[ProgramBlock],
    progress: Option<&mut F>,
) -> Result<Vec<PlacedBlock>, GenerateError>
where
    S: ProjectSession + ?Sized,
    L: LibraryCatalog<S> + ?Sized,
    F: FnMut(usize, usize, &str),
{
    let mut progress = progress;
    if let Some(cb) = progress.as_deref_mut() {
        cb(1, 2, "Synthesizing block documents");
    }
    let artifacts = synthesize_all(blocks)
        .into_iter()
        .collect::<Result<Vec<_>, _>>()?;
    place_all_with_progress(session, catalog, blocks, &artifacts, progress)
}

/// Places already synthesized `artifacts`, paired with `blocks` by
/// position, then creates the instance DBs their calls need. Stops at the
/// first failing block.
pub fn place_all_with_progress<S, L, F>(
    session: &mut S,
    catalog: &L,
    blocks: &[ProgramBlock],
    artifacts: &[BlockArtifact],
    progress: Option<&mut F>,
) -> Result<Vec<PlacedBlock>, GenerateError>
where
    S: ProjectSession + ?Sized,
    L: LibraryCatalog<S> + ?Sized,
    F: FnMut(usize, usize, &str),
{
    let mut progress = progress.map(|cb| cb as &mut GenerateProgressCallback<'_>);
    let total = blocks.len().max(1);

    let mut placed = Vec::with_capacity(blocks.len());
    for (index, (block, artifact)) in blocks.iter().zip(artifacts).enumerate() {
        report_progress(&mut progress, index + 1, total, &block.name);
        let placement = place_artifact(session, catalog, block, artifact)?;
        placed.push(PlacedBlock {
            name: block.name.clone(),
            placement,
        });
    }
    placed.extend(create_instance_dbs(session, blocks)?);
    info!(count = placed.len(), "generation finished");
    Ok(placed)
}

fn report_progress(
    progress: &mut Option<&mut GenerateProgressCallback<'_>>,
    step: usize,
    total: usize,
    label: &str,
) {
    if let Some(cb) = progress.as_deref_mut() {
        cb(step, total, label);
    }
}
