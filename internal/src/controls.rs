//! Request controls for windowed searches: server side sorting (RFC 2891)
//! and the virtual list view draft, both critical.

use bytes::BytesMut;
use ldap3::asn1::{write, ASNTag, Boolean, Integer, OctetString, Sequence, Tag, TagClass};
use ldap3::controls::RawControl;

use crate::error::{DirectoryError, Result};

pub const SORT_REQUEST_OID: &str = "1.2.840.113556.1.4.473";
pub const VLV_REQUEST_OID: &str = "2.16.840.1.113730.3.4.9";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub attribute: String,
    pub reverse: bool,
}

impl SortKey {
    pub fn ascending(attribute: &str) -> Self {
        Self {
            attribute: attribute.to_string(),
            reverse: false,
        }
    }
}

/// Offset based virtual list view request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualListView {
    pub before_count: i64,
    pub after_count: i64,
    /// 1-based position of the target entry
    pub offset: i64,
    /// Estimated size of the whole list, 0 when unknown
    pub content_count: i64,
}

fn encode(tag: Tag) -> Result<Vec<u8>> {
    let mut buf = BytesMut::new();
    write::encode_into(&mut buf, tag.into_structure())
        .map_err(|e| DirectoryError::Transport(format!("cannot encode control: {e}")))?;
    Ok(buf.to_vec())
}

fn integer(value: i64) -> Tag {
    Tag::Integer(Integer {
        inner: value,
        ..Default::default()
    })
}

pub fn sort_control(keys: &[SortKey]) -> Result<RawControl> {
    let keys = keys
        .iter()
        .map(|key| {
            let mut inner = vec![Tag::OctetString(OctetString {
                inner: key.attribute.as_bytes().to_vec(),
                ..Default::default()
            })];
            // reverseOrder is DEFAULT FALSE and must be omitted in that case
            if key.reverse {
                inner.push(Tag::Boolean(Boolean {
                    id: 1,
                    class: TagClass::Context,
                    inner: true,
                }));
            }
            Tag::Sequence(Sequence {
                inner,
                ..Default::default()
            })
        })
        .collect();

    let val = encode(Tag::Sequence(Sequence {
        inner: keys,
        ..Default::default()
    }))?;

    Ok(RawControl {
        ctype: SORT_REQUEST_OID.to_string(),
        crit: true,
        val: Some(val),
    })
}

pub fn vlv_control(view: &VirtualListView) -> Result<RawControl> {
    let by_offset = Tag::Sequence(Sequence {
        id: 0,
        class: TagClass::Context,
        inner: vec![integer(view.offset), integer(view.content_count)],
    });

    let val = encode(Tag::Sequence(Sequence {
        inner: vec![
            integer(view.before_count),
            integer(view.after_count),
            by_offset,
        ],
        ..Default::default()
    }))?;

    Ok(RawControl {
        ctype: VLV_REQUEST_OID.to_string(),
        crit: true,
        val: Some(val),
    })
}
