//! `multipart/x-mixed-replace` framing
//!
//! Each part replaces the previous image in the browser:
//!
//! ```text
//! --FRAME\r\n
//! Content-Type: image/jpeg\r\n
//! Content-Length: <n>\r\n
//! \r\n
//! <n bytes of JPEG>\r\n
//! ```

use bytes::{BufMut, Bytes, BytesMut};

/// Boundary string separating parts
pub const BOUNDARY: &str = "FRAME";

/// Response content type announcing the boundary
pub const CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=FRAME";

/// Content type of every part
pub const PART_CONTENT_TYPE: &str = "image/jpeg";

/// Bytes written after each part's payload
pub const PART_TRAILER: &[u8] = b"\r\n";

/// Build the delimiter and headers preceding a payload of `len` bytes
pub fn part_header(len: usize) -> Bytes {
    let mut buf = BytesMut::with_capacity(64);
    buf.put_slice(b"--");
    buf.put_slice(BOUNDARY.as_bytes());
    buf.put_slice(b"\r\nContent-Type: ");
    buf.put_slice(PART_CONTENT_TYPE.as_bytes());
    buf.put_slice(b"\r\nContent-Length: ");
    buf.put_slice(len.to_string().as_bytes());
    buf.put_slice(b"\r\n\r\n");
    buf.freeze()
}

/// Total bytes one part occupies on the wire
pub fn part_size(len: usize) -> usize {
    part_header(len).len() + len + PART_TRAILER.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_header() {
        let header = part_header(1234);
        assert_eq!(
            &header[..],
            b"--FRAME\r\nContent-Type: image/jpeg\r\nContent-Length: 1234\r\n\r\n"
        );
    }

    #[test]
    fn test_part_header_empty_payload() {
        let header = part_header(0);
        assert!(header.ends_with(b"Content-Length: 0\r\n\r\n"));
    }

    #[test]
    fn test_content_type_names_boundary() {
        assert!(CONTENT_TYPE.ends_with(&format!("boundary={}", BOUNDARY)));
    }

    #[test]
    fn test_part_size() {
        assert_eq!(part_size(10), part_header(10).len() + 12);
    }
}
