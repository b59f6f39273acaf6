//! Tag hierarchy built from `::`-separated tag names.

use std::{
    collections::BTreeMap,
    fmt,
};

use crate::{
    anki::NoteService,
    core::Result,
};

pub const TAG_SEPARATOR: &str = "::";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagTree {
    children: BTreeMap<String, TagTree>,
}

impl TagTree {
    pub fn from_tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut root = TagTree::default();
        for tag in tags {
            let mut level = &mut root;
            for part in tag.as_ref().split(TAG_SEPARATOR).filter(|p| !p.is_empty()) {
                level = level.children.entry(part.to_string()).or_default();
            }
        }
        root
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    fn write_level(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        for (name, child) in &self.children {
            writeln!(f, "{}{}", "  ".repeat(depth), name)?;
            child.write_level(f, depth + 1)?;
        }
        Ok(())
    }
}

/// Two spaces of indent per level.
impl fmt::Display for TagTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_level(f, 0)
    }
}

pub fn fetch_tag_tree<S: NoteService + ?Sized>(service: &S) -> Result<TagTree> {
    Ok(TagTree::from_tags(service.get_tags()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anki::fake::FakeService;

    #[test]
    fn test_tree_rendering() {
        let tree = TagTree::from_tags(["grammar::n5::particles", "grammar::n4", "vocab", "grammar::n5::verbs"]);
        assert_eq!(tree.to_string(), "grammar\n  n4\n  n5\n    particles\n    verbs\nvocab\n");
    }

    #[test]
    fn test_shared_prefixes_merge() {
        let tree = TagTree::from_tags(["a::b", "a::c", "a::b", "d", "::e"]);
        assert_eq!(tree.to_string(), "a\n  b\n  c\nd\ne\n");
    }

    #[test]
    fn test_fetch_from_service() {
        let service = FakeService { tags: vec!["x::y".to_string()], ..Default::default() };
        let tree = fetch_tag_tree(&service).unwrap();
        assert_eq!(tree.to_string(), "x\n  y\n");
        assert!(TagTree::from_tags(Vec::<String>::new()).is_empty());
    }
}
