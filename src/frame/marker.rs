//! JPEG start-of-image marker detection

/// Two-byte JPEG start-of-image marker that begins every frame
pub const FRAME_MARKER: [u8; 2] = [0xFF, 0xD8];

/// Check whether a chunk begins a new frame
#[inline]
pub fn starts_frame(chunk: &[u8]) -> bool {
    chunk.starts_with(&FRAME_MARKER)
}

/// Find the first marker at or after `from`
pub fn find_marker(buf: &[u8], from: usize) -> Option<usize> {
    if from >= buf.len() {
        return None;
    }
    buf[from..]
        .windows(FRAME_MARKER.len())
        .position(|w| w == FRAME_MARKER)
        .map(|pos| pos + from)
}

/// Start-of-scan marker; entropy-coded data follows it
const SOS: u8 = 0xDA;

/// Result of walking the marker segments that open a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderScan {
    /// Headers end at this offset (the start-of-scan marker)
    Complete(usize),
    /// More bytes are needed to reach the start of scan
    Incomplete,
    /// Not a well-formed header at this offset
    Invalid(usize),
}

/// Walk the header segments of a frame that starts with the SOI marker
///
/// Segment payloads (APPn, DQT, DHT, ...) are skipped by their length, so an
/// embedded EXIF thumbnail with its own SOI is never taken for a frame start.
/// Entropy-coded data after SOS cannot contain an SOI: any `0xFF` there is
/// stuffed or a restart marker.
pub fn scan_header(frame: &[u8]) -> HeaderScan {
    let mut pos = FRAME_MARKER.len();

    loop {
        if pos + 2 > frame.len() {
            return HeaderScan::Incomplete;
        }
        if frame[pos] != 0xFF {
            return HeaderScan::Invalid(pos);
        }

        match frame[pos + 1] {
            // Fill byte
            0xFF => pos += 1,
            SOS => return HeaderScan::Complete(pos),
            // SOI/EOI cannot appear among the headers
            0xD8 | 0xD9 => return HeaderScan::Invalid(pos),
            // Standalone markers (TEM, RSTn)
            0x01 | 0xD0..=0xD7 => pos += 2,
            _ => {
                if pos + 4 > frame.len() {
                    return HeaderScan::Incomplete;
                }
                let len = u16::from_be_bytes([frame[pos + 2], frame[pos + 3]]) as usize;
                if len < 2 {
                    return HeaderScan::Invalid(pos);
                }
                pos += 2 + len;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_frame() {
        assert!(starts_frame(&[0xFF, 0xD8, 0xFF, 0xE0]));
        assert!(starts_frame(&[0xFF, 0xD8]));
        assert!(!starts_frame(&[0xFF]));
        assert!(!starts_frame(&[]));
        assert!(!starts_frame(&[0x00, 0xFF, 0xD8]));
    }

    #[test]
    fn test_find_marker() {
        let buf = [0x01, 0xFF, 0xD8, 0x02, 0xFF, 0xD8];
        assert_eq!(find_marker(&buf, 0), Some(1));
        assert_eq!(find_marker(&buf, 2), Some(4));
        assert_eq!(find_marker(&buf, 5), None);
        assert_eq!(find_marker(&buf, 10), None);
    }

    #[test]
    fn test_find_marker_ignores_lone_ff() {
        let buf = [0xFF, 0x00, 0xFF, 0xD9, 0xFF];
        assert_eq!(find_marker(&buf, 0), None);
    }

    #[test]
    fn test_scan_header_skips_segment_payloads() {
        // SOI, APP1 holding a thumbnail with its own SOI/EOI, SOS
        let frame = [
            0xFF, 0xD8, // SOI
            0xFF, 0xE1, 0x00, 0x08, 0xFF, 0xD8, 0x01, 0x02, 0xFF, 0xD9, // APP1
            0xFF, 0xDA, 0x00, 0x02, 0x11, // SOS
        ];

        assert_eq!(scan_header(&frame), HeaderScan::Complete(12));
        assert_eq!(find_marker(&frame, 1), Some(6));
    }

    #[test]
    fn test_scan_header_incomplete() {
        assert_eq!(scan_header(&[0xFF, 0xD8]), HeaderScan::Incomplete);
        assert_eq!(scan_header(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00]), HeaderScan::Incomplete);
        // Segment runs past the end
        assert_eq!(
            scan_header(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x00]),
            HeaderScan::Incomplete
        );
    }

    #[test]
    fn test_scan_header_invalid() {
        assert_eq!(scan_header(&[0xFF, 0xD8, 0x01, 0x02]), HeaderScan::Invalid(2));
        assert_eq!(scan_header(&[0xFF, 0xD8, 0xFF, 0xD8]), HeaderScan::Invalid(2));
        assert_eq!(
            scan_header(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x01]),
            HeaderScan::Invalid(2)
        );
    }
}
