use std::cmp::Ordering;

/// How two elements of a buffer are ordered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompareOptions {
    /// Compare magnitudes of numeric values.
    pub absolute: bool,
    /// Compare strings with [`numeric_high_cmp`].
    pub numeric_high: bool,
}

/// Compare strings, ordering runs of decimal digits by their numeric value.
///
/// Non-digit characters compare bytewise. Two digit runs with the same value compare by length,
/// the shorter run ranking lower, so `"x9" < "x09"`.
pub fn numeric_high_cmp(a: &str, b: &str) -> Ordering {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        if a[i].is_ascii_digit() && b[j].is_ascii_digit() {
            let run_a = digit_run(&a[i..]);
            let run_b = digit_run(&b[j..]);
            let ord = compare_digit_runs(&a[i..i + run_a], &b[j..j + run_b]);
            if ord != Ordering::Equal {
                return ord;
            }
            i += run_a;
            j += run_b;
        } else {
            match a[i].cmp(&b[j]) {
                Ordering::Equal => {
                    i += 1;
                    j += 1;
                }
                ord => return ord,
            }
        }
    }
    (a.len() - i).cmp(&(b.len() - j))
}

fn digit_run(s: &[u8]) -> usize {
    s.iter().take_while(|c| c.is_ascii_digit()).count()
}

fn compare_digit_runs(a: &[u8], b: &[u8]) -> Ordering {
    let sig_a = strip_leading_zeros(a);
    let sig_b = strip_leading_zeros(b);
    sig_a
        .len()
        .cmp(&sig_b.len())
        .then_with(|| sig_a.cmp(sig_b))
        .then_with(|| a.len().cmp(&b.len()))
}

fn strip_leading_zeros(s: &[u8]) -> &[u8] {
    let zeros = s.iter().take_while(|c| **c == b'0').count();
    &s[zeros..]
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("a2", "a10", Ordering::Less)]
    #[case("x9", "x09", Ordering::Less)]
    #[case("x10", "x9", Ordering::Greater)]
    #[case("file7b", "file7a", Ordering::Greater)]
    #[case("abc", "abc", Ordering::Equal)]
    #[case("ab", "abc", Ordering::Less)]
    #[case("1000000000000000000000000", "999", Ordering::Greater)]
    #[case("", "0", Ordering::Less)]
    fn orders(#[case] a: &str, #[case] b: &str, #[case] expected: Ordering) {
        assert_eq!(numeric_high_cmp(a, b), expected);
        assert_eq!(numeric_high_cmp(b, a), expected.reverse());
    }
}
