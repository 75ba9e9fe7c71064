//! Folder hierarchy and special-use classification

use crate::session::RawFolder;
use serde::Serialize;
use std::collections::HashSet;

/// Type of email folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FolderType {
    Inbox,
    Sent,
    Drafts,
    Trash,
    Spam,
    Archive,
    /// User-created folder
    Other,
}

impl FolderType {
    /// Detect folder type from IMAP special-use attributes (RFC 6154)
    ///
    /// Matches with or without the leading backslash.
    pub fn from_attributes(attributes: &[String]) -> Option<Self> {
        attributes.iter().find_map(|attr| {
            match attr.to_ascii_lowercase().trim_start_matches('\\') {
                "inbox" => Some(FolderType::Inbox),
                "sent" => Some(FolderType::Sent),
                "drafts" => Some(FolderType::Drafts),
                "trash" => Some(FolderType::Trash),
                "junk" => Some(FolderType::Spam),
                "archive" | "all" => Some(FolderType::Archive),
                _ => None,
            }
        })
    }

    /// Detect folder type from its leaf name
    pub fn from_name(name: &str) -> Self {
        let lower = name.to_lowercase();
        if lower == "inbox" {
            FolderType::Inbox
        } else if lower.contains("sent") {
            FolderType::Sent
        } else if lower.contains("draft") {
            FolderType::Drafts
        } else if lower.contains("trash") || lower.contains("bin") || lower.contains("deleted") {
            FolderType::Trash
        } else if lower.contains("spam") || lower.contains("junk") {
            FolderType::Spam
        } else if lower.contains("archive") || lower.contains("all mail") {
            FolderType::Archive
        } else {
            FolderType::Other
        }
    }

    pub fn detect(attributes: &[String], name: &str) -> Self {
        Self::from_attributes(attributes).unwrap_or_else(|| Self::from_name(name))
    }
}

/// One folder of a flattened listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderDescriptor {
    /// Leaf name
    pub name: String,
    /// Full path, usable with SELECT
    pub path: String,
    pub delimiter: Option<String>,
    /// Unknown on listing
    pub message_count: Option<u32>,
    pub folder_type: FolderType,
    pub attributes: Vec<String>,
    pub selectable: bool,
}

#[derive(Debug)]
struct Node {
    segment: String,
    delimiter: Option<String>,
    /// `None` for parents the server never listed
    attributes: Option<Vec<String>>,
    children: Vec<Node>,
}

impl Node {
    fn new(segment: &str, delimiter: Option<&str>) -> Self {
        Self {
            segment: segment.to_string(),
            delimiter: delimiter.map(str::to_string),
            attributes: None,
            children: Vec::new(),
        }
    }
}

fn child_mut<'a>(nodes: &'a mut Vec<Node>, segment: &str, delimiter: Option<&str>) -> &'a mut Node {
    let idx = match nodes.iter().position(|n| n.segment == segment) {
        Some(idx) => idx,
        None => {
            nodes.push(Node::new(segment, delimiter));
            nodes.len() - 1
        }
    };
    &mut nodes[idx]
}

fn insert(roots: &mut Vec<Node>, folder: &RawFolder) {
    let delimiter = folder.delimiter.as_deref().filter(|d| !d.is_empty());
    let segments: Vec<&str> = match delimiter {
        Some(delim) => folder.name.split(delim).collect(),
        None => vec![folder.name.as_str()],
    };

    let Some((last, parents)) = segments.split_last() else {
        return;
    };
    let mut level = roots;
    for segment in parents {
        level = &mut child_mut(level, segment, delimiter).children;
    }
    let node = child_mut(level, last, delimiter);
    node.attributes = Some(folder.attributes.clone());
}

fn flatten(nodes: &[Node], parent: Option<&str>, out: &mut Vec<FolderDescriptor>) {
    for node in nodes {
        let path = match (parent, node.delimiter.as_deref()) {
            (Some(parent), Some(delim)) => format!("{}{}{}", parent, delim, node.segment),
            (Some(parent), None) => format!("{}{}", parent, node.segment),
            (None, _) => node.segment.clone(),
        };
        let attributes = node
            .attributes
            .clone()
            .unwrap_or_else(|| vec!["\\Noselect".to_string()]);
        let selectable = !attributes.iter().any(|a| {
            let lower = a.to_ascii_lowercase();
            lower == "\\noselect" || lower == "\\nonexistent"
        });

        out.push(FolderDescriptor {
            name: node.segment.clone(),
            folder_type: FolderType::detect(&attributes, &node.segment),
            path: path.clone(),
            delimiter: node.delimiter.clone(),
            message_count: None,
            attributes,
            selectable,
        });
        flatten(&node.children, Some(&path), out);
    }
}

/// Build the hierarchy from a LIST response and flatten it depth-first
///
/// Parents appear before their children; siblings keep server order.
pub fn flatten_folders(raw: &[RawFolder]) -> Vec<FolderDescriptor> {
    let mut roots = Vec::new();
    for folder in raw {
        insert(&mut roots, folder);
    }

    let mut folders = Vec::with_capacity(raw.len());
    flatten(&roots, None, &mut folders);
    deduplicate_folder_types(&mut folders);
    folders
}

/// Keep one folder per special-use type
///
/// Attribute-detected types always win. Name-based detection only applies if
/// no folder already claimed that type via attributes, and then only for the
/// first folder of that type.
pub fn deduplicate_folder_types(folders: &mut [FolderDescriptor]) {
    let attr_types: HashSet<FolderType> = folders
        .iter()
        .filter(|f| by_attribute(f))
        .map(|f| f.folder_type)
        .collect();

    let mut seen_name_types = HashSet::new();
    for folder in folders.iter_mut() {
        if matches!(folder.folder_type, FolderType::Other | FolderType::Inbox) || by_attribute(folder) {
            continue;
        }
        if attr_types.contains(&folder.folder_type) || !seen_name_types.insert(folder.folder_type) {
            folder.folder_type = FolderType::Other;
        }
    }
}

fn by_attribute(folder: &FolderDescriptor) -> bool {
    FolderType::from_attributes(&folder.attributes).is_some()
}
