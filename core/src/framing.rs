// Copyright 2025 HEM Sp. z o.o.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Splitting of logical message parts into bounded transport frames and back.
//!
//! Every logical part is cut into chunks of at most [`FRAME_CHUNK_SIZE`] characters and the last
//! chunk of each part carries a single [`MESSAGE_TERMINATOR`]. Payloads must not contain the
//! terminator themselves; JSON encoded content never does since control characters are escaped.

use std::mem;

pub const MAX_FRAME_SIZE: usize = 1024;
pub const FRAME_CHUNK_SIZE: usize = MAX_FRAME_SIZE - 8;

pub const MESSAGE_TERMINATOR: char = '\u{3}';
/// Some transports pad string frames with a trailing NUL.
pub const TRANSPORT_PADDING: char = '\0';

pub fn encode<S: AsRef<str>>(parts: &[S]) -> Vec<String> {
    let mut frames = Vec::new();

    for part in parts {
        let part = part.as_ref();
        debug_assert!(!part.contains(MESSAGE_TERMINATOR), "message part contains the terminator");

        let chars: Vec<char> = part.chars().collect();
        if chars.is_empty() {
            frames.push(MESSAGE_TERMINATOR.to_string());
            continue;
        }

        let chunk_count = chars.len().div_ceil(FRAME_CHUNK_SIZE);
        for (i, chunk) in chars.chunks(FRAME_CHUNK_SIZE).enumerate() {
            let mut frame: String = chunk.iter().collect();
            if i + 1 == chunk_count {
                frame.push(MESSAGE_TERMINATOR);
            }
            frames.push(frame);
        }
    }

    frames
}

pub fn decode<S: AsRef<str>>(frames: &[S]) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();

    for frame in frames {
        let frame = frame.as_ref();
        if frame.is_empty() {
            continue;
        }

        if let Some(body) = frame.strip_suffix(MESSAGE_TERMINATOR) {
            current.push_str(body);
            parts.push(mem::take(&mut current));
        } else if let Some(body) = frame.strip_suffix(TRANSPORT_PADDING) {
            match body.strip_suffix(MESSAGE_TERMINATOR) {
                Some(body) => {
                    current.push_str(body);
                    parts.push(mem::take(&mut current));
                }
                None => current.push_str(body),
            }
        } else {
            current.push_str(frame);
        }
    }

    if !current.is_empty() {
        parts.push(current);
    }

    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_parts_survive_a_round_trip() {
        let parts = vec!["status".to_string(), "[]".to_string(), "".to_string(), "żółw 🐢".to_string()];
        assert_eq!(decode(&encode(&parts)), parts);
    }

    #[test]
    fn long_part_is_split_into_ceil_len_over_chunk_frames() {
        let long = "x".repeat(FRAME_CHUNK_SIZE * 3 + 17);
        let frames = encode(&[&long]);

        assert_eq!(frames.len(), (long.len() + FRAME_CHUNK_SIZE - 1) / FRAME_CHUNK_SIZE);
        assert!(frames[..3].iter().all(|f| !f.ends_with(MESSAGE_TERMINATOR)));
        assert!(frames[3].ends_with(MESSAGE_TERMINATOR));
        assert_eq!(decode(&frames), vec![long]);
    }

    #[test]
    fn exact_multiple_of_chunk_size_has_no_extra_frame() {
        let exact = "y".repeat(FRAME_CHUNK_SIZE * 2);
        let frames = encode(&[&exact]);
        assert_eq!(frames.len(), 2);
        assert_eq!(decode(&frames), vec![exact]);
    }

    #[test]
    fn chunking_counts_characters_not_bytes() {
        let wide = "ę".repeat(FRAME_CHUNK_SIZE + 1);
        let frames = encode(&[&wide]);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1], format!("ę{}", MESSAGE_TERMINATOR));
    }

    #[test]
    fn padded_frames_are_handled() {
        let frames = vec![
            "abc\0".to_string(),
            format!("def{}\0", MESSAGE_TERMINATOR),
            format!("ghi{}", MESSAGE_TERMINATOR),
        ];
        assert_eq!(decode(&frames), vec!["abcdef".to_string(), "ghi".to_string()]);
    }

    #[test]
    fn unterminated_tail_is_returned() {
        let frames = vec![format!("one{}", MESSAGE_TERMINATOR), "tw".to_string(), "o".to_string()];
        assert_eq!(decode(&frames), vec!["one".to_string(), "two".to_string()]);
    }

    #[test]
    fn empty_frames_are_skipped() {
        let frames = vec!["".to_string(), format!("a{}", MESSAGE_TERMINATOR), "".to_string()];
        assert_eq!(decode(&frames), vec!["a".to_string()]);
    }
}
