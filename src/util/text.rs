/// Shorten `body` to at most `max_chars` characters, appending an ellipsis
/// when anything was cut. Whitespace runs collapse to single spaces.
pub fn excerpt(body: &str, max_chars: usize) -> String {
    let collapsed = body.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let mut cut: String = collapsed.chars().take(max_chars).collect();
    while cut.ends_with(' ') {
        cut.pop();
    }
    cut.push('…');
    cut
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_bodies_are_untouched() {
        assert_eq!(excerpt("hello  there\nfriend", 40), "hello there friend");
    }

    #[test]
    fn long_bodies_are_cut_on_char_boundaries() {
        assert_eq!(excerpt("ñandú ñandú ñandú", 6), "ñandú…");
        assert_eq!(excerpt("abcdef", 3), "abc…");
    }
}
