/// A path pattern inlined into the catalog: a bounded byte pattern, never
/// a heap allocation. Bounded to 24 bytes, the longest literal the
/// built-in catalog needs.
pub const fn fixed_path(s: &'static str) -> FixedPathLiteral {
    assert!(s.len() <= 24, "path literal exceeds the inline budget");
    FixedPathLiteral(s)
}

/// A `const`-constructible inline path literal. Lets [`super::builtin`]
/// write path patterns as plain string slices in `const` pattern
/// definitions while keeping the "no heap pointer per step" invariant:
/// the bytes live in the binary's read-only data, not on the heap.
#[derive(Clone, Copy, Debug)]
pub struct FixedPathLiteral(pub &'static str);

#[derive(Clone, Debug)]
pub enum ArgConstraintKind {
    Equals(u64),
    NotEquals(u64),
    GreaterThan(u64),
    LessThan(u64),
    BitmaskAny(u64),
    BitmaskAll(u64),
    PathContains(FixedPathLiteral),
    PathStartsWith(FixedPathLiteral),
    PathEquals(FixedPathLiteral),
    /// `path_contains` against either of two literals. Several built-in
    /// patterns need "contains A or contains B" on a single argument
    /// (e.g. `/etc/` or `/root/`); the data model's `arg_constraints`
    /// array is AND-only, so the disjunction has to live inside one
    /// constraint rather than across two slots.
    PathContainsAny(FixedPathLiteral, FixedPathLiteral),
}

#[derive(Clone, Debug)]
pub struct ArgConstraint {
    /// `0..=5`, indexes into `SyscallEvent::args`.
    pub arg_index: u8,
    pub kind: ArgConstraintKind,
}

impl ArgConstraint {
    pub const fn new(arg_index: u8, kind: ArgConstraintKind) -> Self {
        ArgConstraint { arg_index, kind }
    }

    /// Evaluates this constraint against one event's arguments.
    ///
    /// `read_path` resolves `args[arg_index]` as a NUL-terminated
    /// user-space string; path kinds call it lazily and only when needed.
    /// On resolution failure the constraint is `false`, never `true`, and
    /// is never retried.
    pub fn evaluate(&self, args: &[u64; 6], read_path: &mut dyn FnMut(u64) -> Option<Vec<u8>>) -> bool {
        let Some(&arg) = args.get(self.arg_index as usize) else {
            return false;
        };
        match &self.kind {
            ArgConstraintKind::Equals(v) => arg == *v,
            ArgConstraintKind::NotEquals(v) => arg != *v,
            ArgConstraintKind::GreaterThan(v) => arg > *v,
            ArgConstraintKind::LessThan(v) => arg < *v,
            ArgConstraintKind::BitmaskAny(mask) => arg & *mask != 0,
            ArgConstraintKind::BitmaskAll(mask) => arg & *mask == *mask,
            ArgConstraintKind::PathContains(pat) => {
                path_op(arg, read_path, |hay, needle| contains(&hay, needle))(pat)
            }
            ArgConstraintKind::PathStartsWith(pat) => {
                path_op(arg, read_path, |hay, needle| hay.starts_with(needle))(pat)
            }
            ArgConstraintKind::PathEquals(pat) => {
                path_op(arg, read_path, |hay, needle| hay == needle)(pat)
            }
            ArgConstraintKind::PathContainsAny(a, b) => match read_path(arg) {
                Some(hay) => contains(&hay, a.0.as_bytes()) || contains(&hay, b.0.as_bytes()),
                None => false,
            },
        }
    }
}

fn path_op<'a>(
    arg: u64,
    read_path: &'a mut dyn FnMut(u64) -> Option<Vec<u8>>,
    cmp: impl Fn(&[u8], &[u8]) -> bool + 'a,
) -> impl FnOnce(&FixedPathLiteral) -> bool + 'a {
    move |pat: &FixedPathLiteral| match read_path(arg) {
        Some(hay) => cmp(&hay, pat.0.as_bytes()),
        None => false,
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod test {
    use super::*;

    fn resolver(value: &'static str) -> impl FnMut(u64) -> Option<Vec<u8>> {
        move |_| Some(value.as_bytes().to_vec())
    }

    #[test]
    fn path_contains_matches_substring() {
        let c = ArgConstraint::new(0, ArgConstraintKind::PathContains(fixed_path(".ssh/")));
        let mut r = resolver("/home/user/.ssh/id_rsa");
        assert!(c.evaluate(&[0; 6], &mut r));
    }

    #[test]
    fn path_contains_false_on_resolution_failure() {
        let c = ArgConstraint::new(0, ArgConstraintKind::PathContains(fixed_path(".ssh/")));
        let mut r = |_: u64| None;
        assert!(!c.evaluate(&[0; 6], &mut r));
    }

    #[test]
    fn equals_checks_numeric_literal() {
        let c = ArgConstraint::new(1, ArgConstraintKind::Equals(0));
        assert!(c.evaluate(&[0, 0, 0, 0, 0, 0], &mut |_| None));
        assert!(!c.evaluate(&[0, 1, 0, 0, 0, 0], &mut |_| None));
    }
}
