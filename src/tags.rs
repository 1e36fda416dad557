//! Embedded cover art lookup in the leading bytes of an audio file.
//!
//! Only the ID3v2 tag container is decoded. The audio frames after it are
//! never touched, so a prefix that cuts the file anywhere after the tag works
//! as well as the whole file. Tags larger than the prefix miss.

use std::io::Cursor;

use id3::{Tag, frame::Content};

/// Raw picture payload found in a tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedImage {
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// Attached picture frame ids: `APIC` in ID3v2.3/2.4, `PIC` in ID3v2.2
fn is_picture_frame(id: &str) -> bool {
    id.starts_with("APIC") || id.starts_with("PIC")
}

/// Returns the first attached picture found in `prefix`.
///
/// A missing tag, a tag without pictures and undecodable bytes all give
/// `None`. When the tag is cut short, frames decoded before the cut are still
/// searched.
pub fn extract_embedded_image(prefix: &[u8]) -> Option<EmbeddedImage> {
    let tag = match Tag::read_from2(Cursor::new(prefix)) {
        Ok(tag) => tag,
        Err(err) => {
            log::debug!("no complete tag in prefix of {} bytes: {err}", prefix.len());
            err.partial_tag?
        }
    };

    tag.frames()
        .filter(|frame| is_picture_frame(frame.id()))
        .find_map(|frame| match frame.content() {
            Content::Picture(picture) if !picture.data.is_empty() => Some(EmbeddedImage {
                mime_type: picture.mime_type.clone(),
                data: picture.data.clone(),
            }),
            _ => None,
        })
}
