use chrono::NaiveDateTime;

/// Maps a source file stem to the video name used for every artifact.
///
/// Phantom stems (`Y%Y%m%d%H%M%S`) become `YYYY-MM-DDTHH-MM-SS`; colons in any
/// other stem are replaced by dashes so the name is safe on every filesystem.
pub fn video_name(stem: &str) -> String {
    match parse_phantom_stem(stem) {
        Some(t) => t.format("%Y-%m-%dT%H-%M-%S").to_string(),
        None => stem.replace(':', "-"),
    }
}

fn parse_phantom_stem(stem: &str) -> Option<NaiveDateTime> {
    let digits = stem.strip_prefix('Y')?;
    if digits.len() != 14 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDateTime::parse_from_str(digits, "%Y%m%d%H%M%S").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phantom_stems_become_iso() {
        assert_eq!(video_name("Y20230920171418"), "2023-09-20T17-14-18");
    }

    #[test]
    fn colons_are_replaced() {
        assert_eq!(video_name("2023-09-20T17:14:18"), "2023-09-20T17-14-18");
    }

    #[test]
    fn other_stems_are_kept() {
        assert_eq!(video_name("run_04"), "run_04");
        assert_eq!(video_name("Y2023"), "Y2023");
        // Month 13 is not a timestamp
        assert_eq!(video_name("Y20231320171418"), "Y20231320171418");
        assert_eq!(video_name("Y20230230171418"), "Y20230230171418");
        assert_eq!(video_name("Y2023092017141+"), "Y2023092017141+");
    }

    #[test]
    fn leap_days_are_timestamps() {
        assert_eq!(video_name("Y20240229000000"), "2024-02-29T00-00-00");
    }
}
