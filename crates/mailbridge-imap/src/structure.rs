//! MIME body structure as reported by the server
//!
//! Converted from the BODYSTRUCTURE fetch item into an owned tree so the
//! attachment walk does not depend on the wire representation.

use imap_proto::types::{BodyContentCommon, BodyParams, BodyStructure, ContentEncoding};

/// One node of a message's MIME tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyPart {
    /// Single part (text, image, application, ...)
    Leaf(LeafPart),
    /// Embedded `message/rfc822` with its own tree
    Message { part: LeafPart, body: Box<BodyPart> },
    /// `multipart/*` container
    Multipart { subtype: String, children: Vec<BodyPart> },
}

/// Headers of a single MIME part
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeafPart {
    /// Lowercased `type/subtype`
    pub content_type: String,
    /// Content-Type parameters
    pub params: Vec<(String, String)>,
    /// Lowercased disposition type (`attachment`, `inline`)
    pub disposition: Option<String>,
    /// Content-Disposition parameters
    pub disposition_params: Vec<(String, String)>,
    /// Lowercased transfer encoding
    pub encoding: String,
    /// Encoded size in octets
    pub size: u32,
}

impl LeafPart {
    /// Explicit attachment disposition or a file name parameter
    pub fn is_attachment(&self) -> bool {
        if self.disposition.as_deref() == Some("attachment") {
            return true;
        }
        has_param(&self.params, "name") || has_param(&self.disposition_params, "filename")
    }
}

impl BodyPart {
    /// Whether any part of the tree looks like an attachment
    pub fn has_attachment(&self) -> bool {
        match self {
            BodyPart::Leaf(part) => part.is_attachment(),
            BodyPart::Message { part, body } => part.is_attachment() || body.has_attachment(),
            BodyPart::Multipart { children, .. } => children.iter().any(BodyPart::has_attachment),
        }
    }
}

fn has_param(params: &[(String, String)], key: &str) -> bool {
    params.iter().any(|(k, _)| k.eq_ignore_ascii_case(key))
}

fn owned_params(params: &BodyParams<'_>) -> Vec<(String, String)> {
    params
        .as_ref()
        .map(|list| {
            list.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        })
        .unwrap_or_default()
}

fn encoding_name(encoding: &ContentEncoding<'_>) -> String {
    match encoding {
        ContentEncoding::SevenBit => "7bit".to_string(),
        ContentEncoding::EightBit => "8bit".to_string(),
        ContentEncoding::Binary => "binary".to_string(),
        ContentEncoding::Base64 => "base64".to_string(),
        ContentEncoding::QuotedPrintable => "quoted-printable".to_string(),
        ContentEncoding::Other(other) => other.to_ascii_lowercase(),
    }
}

fn leaf(common: &BodyContentCommon<'_>, encoding: &ContentEncoding<'_>, octets: u32) -> LeafPart {
    let (disposition, disposition_params) = match &common.disposition {
        Some(d) => (Some(d.ty.to_ascii_lowercase()), owned_params(&d.params)),
        None => (None, Vec::new()),
    };

    LeafPart {
        content_type: format!("{}/{}", common.ty.ty, common.ty.subtype).to_ascii_lowercase(),
        params: owned_params(&common.ty.params),
        disposition,
        disposition_params,
        encoding: encoding_name(encoding),
        size: octets,
    }
}

impl From<&BodyStructure<'_>> for BodyPart {
    fn from(structure: &BodyStructure<'_>) -> Self {
        match structure {
            BodyStructure::Basic { common, other, .. } | BodyStructure::Text { common, other, .. } => {
                BodyPart::Leaf(leaf(common, &other.transfer_encoding, other.octets))
            }
            BodyStructure::Message {
                common,
                other,
                body,
                ..
            } => BodyPart::Message {
                part: leaf(common, &other.transfer_encoding, other.octets),
                body: Box::new(BodyPart::from(body.as_ref())),
            },
            BodyStructure::Multipart { common, bodies, .. } => BodyPart::Multipart {
                subtype: common.ty.subtype.to_ascii_lowercase(),
                children: bodies.iter().map(BodyPart::from).collect(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(subtype: &str) -> BodyPart {
        BodyPart::Leaf(LeafPart {
            content_type: format!("text/{}", subtype),
            encoding: "quoted-printable".into(),
            size: 120,
            ..Default::default()
        })
    }

    fn alternative() -> BodyPart {
        BodyPart::Multipart {
            subtype: "alternative".into(),
            children: vec![text("plain"), text("html")],
        }
    }

    #[test]
    fn test_plain_alternative_has_no_attachment() {
        assert!(!alternative().has_attachment());
    }

    #[test]
    fn test_nested_disposition_attachment() {
        let pdf = BodyPart::Leaf(LeafPart {
            content_type: "application/pdf".into(),
            disposition: Some("attachment".into()),
            disposition_params: vec![("filename".into(), "invoice.pdf".into())],
            encoding: "base64".into(),
            size: 4096,
            ..Default::default()
        });
        let tree = BodyPart::Multipart {
            subtype: "mixed".into(),
            children: vec![alternative(), pdf],
        };

        assert!(tree.has_attachment());
    }

    #[test]
    fn test_name_parameter_without_disposition() {
        let image = BodyPart::Leaf(LeafPart {
            content_type: "image/png".into(),
            params: vec![("NAME".into(), "logo.png".into())],
            encoding: "base64".into(),
            ..Default::default()
        });
        assert!(image.has_attachment());
    }

    #[test]
    fn test_attachment_inside_forwarded_message() {
        let inner = BodyPart::Multipart {
            subtype: "mixed".into(),
            children: vec![
                text("plain"),
                BodyPart::Leaf(LeafPart {
                    content_type: "application/zip".into(),
                    disposition: Some("attachment".into()),
                    ..Default::default()
                }),
            ],
        };
        let forwarded = BodyPart::Message {
            part: LeafPart {
                content_type: "message/rfc822".into(),
                ..Default::default()
            },
            body: Box::new(inner),
        };
        assert!(forwarded.has_attachment());
    }
}
