//! Transcript accumulation as a fold over final speech segments.

/// Append one final segment to the running transcript.
///
/// Segments are trimmed and joined with a single space. Blank segments
/// leave the transcript unchanged.
pub fn accumulate(previous: &str, segment: &str) -> String {
    let segment = segment.trim();
    if segment.is_empty() {
        return previous.to_owned();
    }
    if previous.is_empty() {
        return segment.to_owned();
    }
    let mut next = String::with_capacity(previous.len() + 1 + segment.len());
    next.push_str(previous);
    next.push(' ');
    next.push_str(segment);
    next
}

/// Fold an ordered sequence of final segments into a transcript.
pub fn transcript_of<'a>(segments: impl IntoIterator<Item = &'a str>) -> String {
    segments
        .into_iter()
        .fold(String::new(), |acc, seg| accumulate(&acc, seg))
}
