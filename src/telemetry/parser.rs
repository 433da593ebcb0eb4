//! Cursor-based parsing of the numeric text cgroup counters are reported in.
//!
//! Counters arrive as raw bytes copied into a bounded buffer, e.g.
//! `cpuacct.usage` holds `"123456789\n"` and `cpuacct.usage_percpu` holds a
//! whitespace-separated list like `"100 200 300 \n"`.

/// Parses an unsigned decimal number at the start of `input`.
///
/// Leading ASCII whitespace and a single `+` sign are skipped. Values that do
/// not fit in a `u64` saturate at [`u64::MAX`].
///
/// # Returns
///
/// `Some((value, consumed))` where `consumed` is the number of bytes the cursor
/// advances by, or `None` if no digits were found, i.e. the cursor made no
/// progress.
pub fn parse_u64_prefix(input: &[u8]) -> Option<(u64, usize)> {
    let mut pos = input
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(input.len());
    if input.get(pos) == Some(&b'+') {
        pos += 1;
    }

    let digits = input[pos..]
        .iter()
        .take_while(|b| b.is_ascii_digit())
        .count();
    if digits == 0 {
        return None;
    }

    let value = input[pos..pos + digits].iter().fold(0u64, |acc, b| {
        acc.saturating_mul(10).saturating_add(u64::from(b - b'0'))
    });

    Some((value, pos + digits))
}

/// Parses every number of a whitespace-separated list, in order.
///
/// Scanning stops at the first position where no number can be parsed, so
/// `"100 200 xyz 400"` yields `[100, 200]`.
pub fn parse_u64_list(input: &[u8]) -> Vec<u64> {
    let mut values = Vec::new();
    let mut cursor = 0;
    while let Some((value, consumed)) = parse_u64_prefix(&input[cursor..]) {
        values.push(value);
        cursor += consumed;
    }
    values
}
