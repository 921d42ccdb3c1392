//! Balancing: the common mode of the branches of a conditional, case, or
//! serial clause.
//!
//! Candidates are tried at increasing depref levels; at each level every
//! alternative must coerce to the candidate at the requested strength. The
//! deepest winning candidate is kept, preferring a `FLEX` spelling over the
//! plain row it deflexes to.

use super::predicates::{coercible, depref_once, Regime, Sort};
use super::{Mode, ModeTable, Moid};

pub fn balanced_mode(t: &mut ModeTable, m: Moid, sort: Sort, regime: Regime) -> Moid {
    let m = t.canonical(m);
    let alts: Vec<Moid> = match t.mode(m) {
        Mode::Union(pack) | Mode::Series(pack) => pack.iter().map(|f| f.moid).collect(),
        _ => return m,
    };
    if alts.is_empty() {
        return m;
    }
    let max_level = alts
        .iter()
        .map(|&a| depref_depth(t, a))
        .max()
        .unwrap_or(0);

    let mut winner: Option<(Moid, usize)> = None;
    for level in 0..=max_level {
        for &c in &alts {
            let target = match depref_times(t, c, level) {
                Some(x) => x,
                None => continue,
            };
            let all_fit = alts
                .iter()
                .all(|&a| coercible(t, a, target, sort, regime));
            if !all_fit {
                continue;
            }
            winner = Some(match winner {
                None => (target, level),
                Some((w, wl)) => {
                    let dt = t.deflexed(target);
                    let dw = t.deflexed(w);
                    if dt == dw && matches!(t.mode(target), Mode::Flex(_)) {
                        (target, level)
                    } else if level > wl {
                        (target, level)
                    } else {
                        (w, wl)
                    }
                }
            });
        }
    }
    winner.map(|(w, _)| w).unwrap_or(m)
}

fn depref_depth(t: &ModeTable, mut m: Moid) -> usize {
    let mut depth = 0;
    while let Some(next) = depref_once(t, m) {
        m = next;
        depth += 1;
        if depth > 64 {
            break;
        }
    }
    depth
}

fn depref_times(t: &ModeTable, mut m: Moid, times: usize) -> Option<Moid> {
    for _ in 0..times {
        m = depref_once(t, m)?;
    }
    Some(m)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_branches_balance_to_themselves() {
        let mut t = ModeTable::new();
        let s = t.make_series(&[Moid::INT, Moid::INT]);
        assert_eq!(balanced_mode(&mut t, s, Sort::Strong, Regime::Safe), Moid::INT);
    }

    #[test]
    fn int_and_real_balance_to_real_strongly() {
        let mut t = ModeTable::new();
        let s = t.register(Mode::Series(vec![
            super::super::Field::plain(Moid::INT),
            super::super::Field::plain(Moid::REAL),
        ]));
        assert_eq!(balanced_mode(&mut t, s, Sort::Strong, Regime::Safe), Moid::REAL);
    }

    #[test]
    fn names_balance_through_dereferencing() {
        let mut t = ModeTable::new();
        let ref_int = t.register(Mode::Ref(Moid::INT));
        let ref_real = t.register(Mode::Ref(Moid::REAL));
        let s = t.register(Mode::Series(vec![
            super::super::Field::plain(ref_int),
            super::super::Field::plain(ref_real),
        ]));
        assert_eq!(balanced_mode(&mut t, s, Sort::Strong, Regime::Safe), Moid::REAL);
    }

    #[test]
    fn string_and_row_char_prefer_flex() {
        let mut t = ModeTable::new();
        let s = t.register(Mode::Series(vec![
            super::super::Field::plain(Moid::ROW_CHAR),
            super::super::Field::plain(Moid::STRING),
        ]));
        let b = balanced_mode(&mut t, s, Sort::Strong, Regime::Force);
        assert_eq!(b, Moid::STRING);
    }

    #[test]
    fn unbalanceable_pack_returns_the_union() {
        let mut t = ModeTable::new();
        let s = t.make_series(&[Moid::INT, Moid::BOOL]);
        let u = t.make_united(s);
        assert_eq!(balanced_mode(&mut t, u, Sort::Firm, Regime::Safe), u);
    }
}
