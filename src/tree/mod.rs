//! In-memory section outline of one document.
//!
//! The wire shape (pages holding nested sections, no ids) is converted once on
//! load into an arena keyed by [`SectionId`] with parent/child links, mutated in
//! place, and serialized back to the wire shape only when a write is built.

use crate::models::{ApiPage, ApiSection, DocumentContent, PageContent, UpdateDocumentRequest};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SectionId(pub u64);

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    #[error("Section not found: {0}")]
    UnknownSection(SectionId),

    #[error("Parent section not found: {0}")]
    UnknownParent(SectionId),
}

/// Local id allocator. Ids are handed out in increasing order and never reused
/// within a tree, so a freshly loaded document numbers its sections 1..n in
/// document order.
#[derive(Clone, Debug)]
pub struct SectionIds {
    next: u64,
}

impl Default for SectionIds {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl SectionIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self) -> SectionId {
        let id = SectionId(self.next);
        self.next += 1;
        id
    }
}

/// Normalized, nested section.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Section {
    pub id: SectionId,
    pub title: String,
    pub level: u32,
    pub content: String,
    pub subsections: Vec<Section>,
}

/// Assign ids to a wire section and its children.
pub fn normalize(node: &ApiSection, ids: &mut SectionIds) -> Section {
    normalize_at(node, 0, ids)
}

fn normalize_at(node: &ApiSection, parent_level: u32, ids: &mut SectionIds) -> Section {
    let id = ids.next();
    let level = node.level.unwrap_or(parent_level + 1);
    let subsections = node
        .subsections
        .iter()
        .map(|child| normalize_at(child, level, ids))
        .collect();

    Section {
        id,
        title: node.title.clone(),
        level,
        content: node.content.clone(),
        subsections,
    }
}

/// Inverse of [`normalize`]; ids are dropped.
pub fn denormalize(section: &Section) -> ApiSection {
    ApiSection {
        title: section.title.clone(),
        level: Some(section.level),
        content: section.content.clone(),
        subsections: section.subsections.iter().map(denormalize).collect(),
    }
}

#[derive(Clone, Debug)]
pub struct SectionRecord {
    pub id: SectionId,
    pub title: String,
    pub level: u32,
    pub content: String,
    pub parent: Option<SectionId>,
    pub page: usize,
    pub children: Vec<SectionId>,
}

#[derive(Clone, Debug)]
struct PageNode {
    title: String,
    url: String,
    metadata: Option<serde_json::Value>,
    roots: Vec<SectionId>,
}

#[derive(Clone, Debug, Default)]
pub struct SectionTree {
    pages: Vec<PageNode>,
    nodes: HashMap<SectionId, SectionRecord>,
    ids: SectionIds,
}

impl SectionTree {
    pub fn from_content(content: &DocumentContent) -> Self {
        let mut tree = Self::default();
        for page in &content.pages {
            let page_idx = tree.pages.len();
            tree.pages.push(PageNode {
                title: page.title.clone(),
                url: page.url.clone(),
                metadata: page.content.metadata.clone(),
                roots: Vec::new(),
            });
            for node in &page.content.sections {
                let section = normalize(node, &mut tree.ids);
                let id = tree.insert(section, None, page_idx);
                tree.pages[page_idx].roots.push(id);
            }
        }
        tree
    }

    fn insert(&mut self, section: Section, parent: Option<SectionId>, page: usize) -> SectionId {
        let id = section.id;
        let children = section
            .subsections
            .into_iter()
            .map(|child| self.insert(child, Some(id), page))
            .collect();
        self.nodes.insert(
            id,
            SectionRecord {
                id,
                title: section.title,
                level: section.level,
                content: section.content,
                parent,
                page,
                children,
            },
        );
        id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn contains(&self, id: SectionId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn get(&self, id: SectionId) -> Option<&SectionRecord> {
        self.nodes.get(&id)
    }

    pub fn content(&self, id: SectionId) -> Option<&str> {
        self.nodes.get(&id).map(|n| n.content.as_str())
    }

    pub fn set_content(&mut self, id: SectionId, content: &str) -> Result<(), TreeError> {
        let node = self
            .nodes
            .get_mut(&id)
            .ok_or(TreeError::UnknownSection(id))?;
        node.content = content.to_string();
        Ok(())
    }

    pub fn roots(&self, page: usize) -> &[SectionId] {
        self.pages
            .get(page)
            .map(|p| p.roots.as_slice())
            .unwrap_or(&[])
    }

    pub fn first_root(&self) -> Option<SectionId> {
        self.pages.first().and_then(|p| p.roots.first().copied())
    }

    pub fn children(&self, id: SectionId) -> &[SectionId] {
        self.nodes
            .get(&id)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn parent_of(&self, id: SectionId) -> Option<SectionId> {
        self.nodes.get(&id).and_then(|n| n.parent)
    }

    /// Ancestor chain from the root down to `id` (inclusive). Empty if unknown.
    pub fn path_to(&self, id: SectionId) -> Vec<SectionId> {
        let mut path = Vec::new();
        let mut cur = self.nodes.get(&id).map(|n| n.id);
        while let Some(c) = cur {
            path.push(c);
            cur = self.parent_of(c);
        }
        path.reverse();
        path
    }

    /// Every section of every page in document (pre-)order.
    pub fn flatten(&self) -> Vec<SectionId> {
        let mut out = Vec::with_capacity(self.nodes.len());
        for page in &self.pages {
            for &root in &page.roots {
                self.collect(root, &mut out);
            }
        }
        out
    }

    /// All sections nested under `id`, excluding `id` itself.
    pub fn descendants(&self, id: SectionId) -> Vec<SectionId> {
        let mut out = Vec::new();
        for &child in self.children(id) {
            self.collect(child, &mut out);
        }
        out
    }

    fn collect(&self, id: SectionId, out: &mut Vec<SectionId>) {
        out.push(id);
        for &child in self.children(id) {
            self.collect(child, out);
        }
    }

    /// Owned nested copy of one section.
    pub fn section(&self, id: SectionId) -> Option<Section> {
        let node = self.nodes.get(&id)?;
        Some(Section {
            id,
            title: node.title.clone(),
            level: node.level,
            content: node.content.clone(),
            subsections: node
                .children
                .iter()
                .filter_map(|&c| self.section(c))
                .collect(),
        })
    }

    /// Hand out an id for a section that does not exist yet.
    pub fn reserve_id(&mut self) -> SectionId {
        self.ids.next()
    }

    /// Append a new empty section as the last child of `parent`, or as the last
    /// root of the first page when `parent` is `None`.
    pub fn add_section(
        &mut self,
        id: SectionId,
        parent: Option<SectionId>,
        title: &str,
    ) -> Result<SectionId, TreeError> {
        let (page, level) = match parent {
            Some(p) => {
                let node = self.nodes.get(&p).ok_or(TreeError::UnknownParent(p))?;
                (node.page, node.level + 1)
            }
            None => {
                if self.pages.is_empty() {
                    self.pages.push(PageNode {
                        title: "Untitled".to_string(),
                        url: String::new(),
                        metadata: None,
                        roots: Vec::new(),
                    });
                }
                (0, 1)
            }
        };

        if id.0 >= self.ids.next {
            self.ids.next = id.0 + 1;
        }

        self.nodes.insert(
            id,
            SectionRecord {
                id,
                title: title.to_string(),
                level,
                content: String::new(),
                parent,
                page,
                children: Vec::new(),
            },
        );
        match parent {
            Some(p) => {
                if let Some(node) = self.nodes.get_mut(&p) {
                    node.children.push(id);
                }
            }
            None => self.pages[0].roots.push(id),
        }
        Ok(id)
    }

    /// Remove a section at any depth together with everything nested under it.
    /// Returns the removed ids, the section itself first.
    pub fn remove_section(&mut self, id: SectionId) -> Result<Vec<SectionId>, TreeError> {
        let node = self.nodes.get(&id).ok_or(TreeError::UnknownSection(id))?;
        let (parent, page) = (node.parent, node.page);

        match parent {
            Some(p) => {
                if let Some(pn) = self.nodes.get_mut(&p) {
                    pn.children.retain(|&c| c != id);
                }
            }
            None => {
                if let Some(pg) = self.pages.get_mut(page) {
                    pg.roots.retain(|&c| c != id);
                }
            }
        }

        let mut removed = vec![id];
        removed.extend(self.descendants(id));
        for r in &removed {
            self.nodes.remove(r);
        }
        Ok(removed)
    }

    pub fn to_pages(&self) -> Vec<ApiPage> {
        self.to_pages_with(&HashMap::new())
    }

    /// Serialize, taking section content from `overlay` where present.
    pub fn to_pages_with(&self, overlay: &HashMap<SectionId, String>) -> Vec<ApiPage> {
        self.pages
            .iter()
            .map(|page| ApiPage {
                title: page.title.clone(),
                url: page.url.clone(),
                content: PageContent {
                    sections: page
                        .roots
                        .iter()
                        .filter_map(|&r| self.wire_section(r, overlay))
                        .collect(),
                    metadata: page.metadata.clone(),
                },
            })
            .collect()
    }

    fn wire_section(
        &self,
        id: SectionId,
        overlay: &HashMap<SectionId, String>,
    ) -> Option<ApiSection> {
        let node = self.nodes.get(&id)?;
        Some(ApiSection {
            title: node.title.clone(),
            level: Some(node.level),
            content: overlay.get(&id).unwrap_or(&node.content).clone(),
            subsections: node
                .children
                .iter()
                .filter_map(|&c| self.wire_section(c, overlay))
                .collect(),
        })
    }

    pub fn to_update_request(
        &self,
        title: &str,
        overlay: &HashMap<SectionId, String>,
    ) -> UpdateDocumentRequest {
        UpdateDocumentRequest {
            title: title.to_string(),
            content: DocumentContent {
                pages: self.to_pages_with(overlay),
            },
        }
    }
}
