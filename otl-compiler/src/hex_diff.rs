//! Hex diffs, for comparing binary output in tests.
//!
//! The layout of the diff follows the pretty_assertions crate: the left and
//! right bytes are printed side by side, with differing bytes in red.

use std::fmt;

use nu_ansi_term::{Color, Style};

/// Assert that two byte slices are equal, printing a hex diff if not.
#[macro_export]
macro_rules! assert_hex_eq {
    ($left:expr, $right:expr$(,)?) => ({
        $crate::assert_hex_eq!(@ $left, $right, "", "");
    });
    ($left:expr, $right:expr, $($arg:tt)*) => ({
        $crate::assert_hex_eq!(@ $left, $right, ": ", $($arg)+);
    });
    (@ $left:expr, $right:expr, $maybe_semicolon:expr, $($arg:tt)*) => ({
        let to_diff = $crate::hex_diff::ToDiff { left: $left, right: $right };
        if (to_diff.left != to_diff.right) {
            ::std::panic!("assertion failed: `(left == right)`{}{}\
               \n\
               \n{}\
               \n",
               $maybe_semicolon,
               format_args!($($arg)*),
               to_diff,
            )
        }
    });
}

pub(crate) struct ToDiff<'a> {
    pub(crate) left: &'a [u8],
    pub(crate) right: &'a [u8],
}

impl fmt::Display for ToDiff<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let (left, right) = self.make_diff();
        write_diff(f, &left, &right, 8)
    }
}

#[derive(Clone, Copy)]
enum DiffItem {
    Same(u8),
    Different(u8),
    Blank,
}

impl ToDiff<'_> {
    fn make_diff(&self) -> (Vec<DiffItem>, Vec<DiffItem>) {
        let mut left = Vec::new();
        let mut right = Vec::new();

        for item in diff::slice(self.left, self.right) {
            match item {
                diff::Result::Both(byte, _) => {
                    // line the two sides up again before a shared byte
                    let len = left.len().max(right.len());
                    left.resize(len, DiffItem::Blank);
                    right.resize(len, DiffItem::Blank);
                    left.push(DiffItem::Same(*byte));
                    right.push(DiffItem::Same(*byte));
                }
                diff::Result::Left(byte) => left.push(DiffItem::Different(*byte)),
                diff::Result::Right(byte) => right.push(DiffItem::Different(*byte)),
            }
        }
        let len = left.len().max(right.len());
        left.resize(len, DiffItem::Blank);
        right.resize(len, DiffItem::Blank);
        (left, right)
    }
}

fn write_diff(
    f: &mut impl fmt::Write,
    left: &[DiffItem],
    right: &[DiffItem],
    width: usize,
) -> fmt::Result {
    let separator = Color::White.dimmed();
    for (row, (left, right)) in left.chunks(width).zip(right.chunks(width)).enumerate() {
        write!(f, "{:>6} ", row * width)?;
        write_items(f, left, width)?;
        write!(f, "{}", separator.paint("| "))?;
        write_items(f, right, width)?;
        writeln!(f)?;
    }
    Ok(())
}

fn write_items(f: &mut impl fmt::Write, items: &[DiffItem], width: usize) -> fmt::Result {
    for item in items {
        match item {
            DiffItem::Same(byte) => write!(f, "{byte:02x} ")?,
            DiffItem::Different(byte) => {
                write!(f, "{}", Style::from(Color::Red).paint(format!("{byte:02x} ")))?
            }
            DiffItem::Blank => write!(f, "__ ")?,
        }
    }
    for _ in items.len()..width {
        write!(f, "   ")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_lines_up() {
        let diff = ToDiff {
            left: &[1, 2, 3],
            right: &[1, 3],
        };
        let (left, right) = diff.make_diff();
        assert_eq!(left.len(), right.len());
        let text = diff.to_string();
        assert!(text.contains("01 "));
        assert!(text.contains("__ "));
    }

    #[test]
    #[should_panic(expected = "assertion failed")]
    fn macro_panics_on_difference() {
        crate::assert_hex_eq!(&[0u8, 1][..], &[0u8, 2][..]);
    }
}
