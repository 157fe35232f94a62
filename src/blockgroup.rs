use anyhow::Result;
use tracing::debug;

/// Tree of program block groups in a target project.
pub trait BlockGroupTree {
    type Group: Clone;

    fn root_group(&self) -> Self::Group;

    /// Direct child of `parent` called `name`, if any.
    fn find_group(&self, parent: &Self::Group, name: &str) -> Result<Option<Self::Group>>;

    fn create_group(&mut self, parent: &Self::Group, name: &str) -> Result<Self::Group>;
}

/// Path segments naming groups below the root. A missing leading `/` is
/// implied; empty and `.` segments are ignored. Names are kept verbatim.
pub fn path_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
}

/// Walks `path` from the root group without creating anything.
pub fn find_block_group<T>(tree: &T, path: &str) -> Result<Option<T::Group>>
where
    T: BlockGroupTree + ?Sized,
{
    let mut current = tree.root_group();
    for segment in path_segments(path) {
        match tree.find_group(&current, segment)? {
            Some(group) => current = group,
            None => {
                debug!(path, missing = segment, "block group not found");
                return Ok(None);
            }
        }
    }
    Ok(Some(current))
}

/// Walks `path` from the root group, creating every missing segment.
pub fn ensure_block_group<T>(tree: &mut T, path: &str) -> Result<T::Group>
where
    T: BlockGroupTree + ?Sized,
{
    let mut current = tree.root_group();
    for segment in path_segments(path) {
        current = match tree.find_group(&current, segment)? {
            Some(group) => group,
            None => {
                debug!(path, created = segment, "creating block group");
                tree.create_group(&current, segment)?
            }
        };
    }
    Ok(current)
}

pub fn locate_block_group<T>(
    tree: &mut T,
    path: &str,
    create_missing: bool,
) -> Result<Option<T::Group>>
where
    T: BlockGroupTree + ?Sized,
{
    if create_missing {
        ensure_block_group(tree, path).map(Some)
    } else {
        find_block_group(&*tree, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::MemoryProject;

    #[test]
    fn segments_skip_empty_and_current_dir() {
        let segments = path_segments("//A/./B/").collect::<Vec<_>>();
        assert_eq!(segments, ["A", "B"]);
        assert_eq!(path_segments("/").count(), 0);
    }

    #[test]
    fn segments_keep_surrounding_spaces() {
        let segments = path_segments("/ Line 1 /Cell").collect::<Vec<_>>();
        assert_eq!(segments, [" Line 1 ", "Cell"]);
    }

    #[test]
    fn creates_nested_groups_in_order() {
        let mut project = MemoryProject::new();
        let group = locate_block_group(&mut project, "/A/B", true)
            .expect("walk")
            .expect("group");
        assert_eq!(project.group_path(group), "/A/B");
        assert_eq!(project.group_paths(), ["/", "/A", "/A/B"]);
    }

    #[test]
    fn missing_group_without_create_is_not_found() {
        let mut project = MemoryProject::new();
        assert!(locate_block_group(&mut project, "/A/B", false)
            .expect("walk")
            .is_none());
        assert_eq!(project.group_paths(), ["/"]);
    }

    #[test]
    fn unrooted_paths_resolve_from_root() {
        let mut project = MemoryProject::new();
        let created = ensure_block_group(&mut project, "Plant/Line1").expect("create");
        let found = find_block_group(&project, "/Plant/Line1")
            .expect("walk")
            .expect("group");
        assert_eq!(created, found);
    }

    #[test]
    fn root_path_is_root_group() {
        let project = MemoryProject::new();
        let root = find_block_group(&project, "/").expect("walk");
        assert_eq!(root, Some(project.root_group()));
    }
}
