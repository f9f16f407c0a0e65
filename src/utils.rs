use edit_distance::edit_distance;

/// Returns the candidate closest to `word`, if it is at most `max_distance` edits away.
///
/// The comparison is case-insensitive; candidates are expected to be upper-case.
pub fn closest_match<'c, I>(word: &str, candidates: I, max_distance: usize) -> Option<&'c str>
where
    I: IntoIterator<Item = &'c str>,
{
    let word = word.to_uppercase();

    candidates
        .into_iter()
        .map(|candidate| (edit_distance(&word, candidate), candidate))
        .filter(|(distance, _)| *distance <= max_distance)
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, candidate)| candidate)
}

#[test]
fn test_closest_match() {
    let names = ["EAX", "EBX", "ESP"];

    assert_eq!(closest_match("eaxx", names.iter().copied(), 1), Some("EAX"));
    assert_eq!(closest_match("esp", names.iter().copied(), 1), Some("ESP"));
    assert_eq!(closest_match("R1", names.iter().copied(), 1), None);
}
