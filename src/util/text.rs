/// テキスト処理ユーティリティ。
///
/// 絵文字除去と書記素単位の切り詰めを提供します。
use unicode_segmentation::UnicodeSegmentation;

/// Pictographic / emoji codepoint ranges, inclusive.
///
/// Covers the blocks the quality filter cares about: emoticons, symbols and
/// pictographs, transport, supplemental pictographs, dingbats, variation
/// selectors, regional indicators and the ZWJ used in emoji sequences.
const PICTOGRAPH_RANGES: &[(u32, u32)] = &[
    (0x1F000, 0x1F0FF), // mahjong / dominoes / playing cards
    (0x1F1E6, 0x1F1FF), // regional indicators
    (0x1F300, 0x1F5FF), // symbols & pictographs
    (0x1F600, 0x1F64F), // emoticons
    (0x1F680, 0x1F6FF), // transport & map
    (0x1F900, 0x1F9FF), // supplemental symbols & pictographs
    (0x1FA70, 0x1FAFF), // symbols & pictographs extended-A
    (0x2600, 0x26FF),   // miscellaneous symbols
    (0x2700, 0x27BF),   // dingbats
    (0x2B00, 0x2BFF),   // arrows & stars (⭐ lives here)
    (0xFE00, 0xFE0F),   // variation selectors
    (0x200D, 0x200D),   // zero-width joiner
];

fn is_pictograph(c: char) -> bool {
    let code = u32::from(c);
    PICTOGRAPH_RANGES
        .iter()
        .any(|&(start, end)| code >= start && code <= end)
}

/// 絵文字レンジの文字を取り除く。
#[must_use]
pub(crate) fn strip_pictographs(text: &str) -> String {
    text.chars().filter(|c| !is_pictograph(*c)).collect()
}

/// 書記素単位で `max` 文字に切り詰める。超過時は末尾を `...` にする。
#[must_use]
pub(crate) fn truncate_graphemes(text: &str, max: usize) -> String {
    let graphemes: Vec<&str> = text.graphemes(true).collect();
    if graphemes.len() <= max {
        return text.to_string();
    }
    let cut = max.saturating_sub(3);
    let mut truncated: String = graphemes[..cut].concat();
    truncated.push_str("...");
    truncated
}
