//! Permittee identities.
//!
//! A [`PermitteeId`] names who a permission can be granted to: the console, an
//! exact user/group/member, or a wildcard class of them. Variants form a DAG
//! through [`PermitteeId::direct_parents`]; a grant to a node covers every node
//! below it. `ExactMember` is dual-rooted: it inherits from both its group's
//! `AnyMember` and the plain `ExactUser` of the same account.
//!
//! String forms are bit-exact and are what gets persisted:
//!
//! | variant | form |
//! |---|---|
//! | Console | `console` |
//! | AnyContact | `*` |
//! | AnyUser / ExactUser | `u*` / `u123` |
//! | AnyGroup / ExactGroup | `g*` / `g123` |
//! | AnyMemberFromAnyGroup / AnyMember / ExactMember | `m*` / `m123.*` / `m123.456` |
//! | AnyFriend / ExactFriend | `f*` / `f123` |
//! | AnyTempFromAnyGroup / AnyTemp / ExactTemp | `t*` / `t123.*` / `t123.456` |
//! | AnyStranger / ExactStranger | `s*` / `s123` |

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PermitteeIdError {
    #[error("'{0}' is not a valid permittee id")]
    Malformed(String),
    #[error("'{0}' is not a valid account number")]
    BadNumber(String),
}

/// Identity that permissions are granted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PermitteeId {
    Console,
    AnyContact,
    AnyUser,
    ExactUser(u64),
    AnyFriend,
    ExactFriend(u64),
    AnyGroup,
    ExactGroup(u64),
    AnyMemberFromAnyGroup,
    AnyMember(u64),
    ExactMember(u64, u64),
    AnyTempFromAnyGroup,
    AnyTemp(u64),
    ExactTemp(u64, u64),
    AnyStranger,
    ExactStranger(u64),
}

/// Anything that acts under a permittee identity (command senders, mostly).
pub trait Permittee {
    fn permittee_id(&self) -> PermitteeId;

    /// See [`PermitteeId::has_child`].
    fn has_child(&self, other: &dyn Permittee) -> bool {
        self.permittee_id().has_child(&other.permittee_id())
    }
}

impl PermitteeId {
    pub fn direct_parents(&self) -> Vec<PermitteeId> {
        use PermitteeId::*;
        match *self {
            Console | AnyContact => vec![],
            AnyUser | AnyGroup => vec![AnyContact],
            ExactUser(_) => vec![AnyUser],
            ExactGroup(_) => vec![AnyGroup],
            AnyMemberFromAnyGroup | AnyFriend | AnyTempFromAnyGroup | AnyStranger => vec![AnyUser],
            AnyMember(_) => vec![AnyMemberFromAnyGroup],
            ExactMember(group, member) => vec![AnyMember(group), ExactUser(member)],
            ExactFriend(id) => vec![ExactUser(id), AnyFriend],
            AnyTemp(group) => vec![AnyMember(group), AnyTempFromAnyGroup],
            ExactTemp(group, member) => vec![ExactMember(group, member)],
            ExactStranger(id) => vec![ExactUser(id), AnyStranger],
        }
    }

    /// Breadth-first closure over [`direct_parents`](Self::direct_parents),
    /// starting with `self`. Nodes reachable by several paths appear once.
    pub fn all_parents_with_self(&self) -> Vec<PermitteeId> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let mut queue = VecDeque::from([*self]);
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id) {
                continue;
            }
            out.push(id);
            queue.extend(id.direct_parents());
        }
        out
    }

    pub fn all_parents(&self) -> Vec<PermitteeId> {
        let mut all = self.all_parents_with_self();
        all.remove(0);
        all
    }

    /// True if `other` is `self` or one of `self`'s transitive parents.
    ///
    /// Compared by string form so identities minted elsewhere (e.g. persisted
    /// grant files) behave the same as the variants here.
    pub fn has_child(&self, other: &PermitteeId) -> bool {
        let other = other.as_string();
        self.all_parents_with_self()
            .iter()
            .any(|p| p.as_string() == other)
    }

    pub fn as_string(&self) -> String {
        use PermitteeId::*;
        match *self {
            Console => "console".to_string(),
            AnyContact => "*".to_string(),
            AnyUser => "u*".to_string(),
            ExactUser(id) => format!("u{}", id),
            AnyFriend => "f*".to_string(),
            ExactFriend(id) => format!("f{}", id),
            AnyGroup => "g*".to_string(),
            ExactGroup(id) => format!("g{}", id),
            AnyMemberFromAnyGroup => "m*".to_string(),
            AnyMember(group) => format!("m{}.*", group),
            ExactMember(group, member) => format!("m{}.{}", group, member),
            AnyTempFromAnyGroup => "t*".to_string(),
            AnyTemp(group) => format!("t{}.*", group),
            ExactTemp(group, member) => format!("t{}.{}", group, member),
            AnyStranger => "s*".to_string(),
            ExactStranger(id) => format!("s{}", id),
        }
    }
}

impl fmt::Display for PermitteeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_string())
    }
}

fn parse_number(s: &str) -> Result<u64, PermitteeIdError> {
    s.parse::<u64>()
        .map_err(|_| PermitteeIdError::BadNumber(s.to_string()))
}

/// Parses `"{group}.{member}"` or `"{group}.*"`.
fn parse_grouped(
    rest: &str,
    original: &str,
    any: fn(u64) -> PermitteeId,
    exact: fn(u64, u64) -> PermitteeId,
) -> Result<PermitteeId, PermitteeIdError> {
    let (group, member) = rest
        .split_once('.')
        .ok_or_else(|| PermitteeIdError::Malformed(original.to_string()))?;
    let group = parse_number(group)?;
    if member == "*" {
        Ok(any(group))
    } else {
        Ok(exact(group, parse_number(member)?))
    }
}

impl FromStr for PermitteeId {
    type Err = PermitteeIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use PermitteeId::*;
        let s = s.trim();
        if s.eq_ignore_ascii_case("console") {
            return Ok(Console);
        }
        if s == "*" {
            return Ok(AnyContact);
        }
        let mut chars = s.chars();
        let kind = chars
            .next()
            .ok_or_else(|| PermitteeIdError::Malformed(s.to_string()))?
            .to_ascii_lowercase();
        let rest = chars.as_str();
        if rest.is_empty() {
            return Err(PermitteeIdError::Malformed(s.to_string()));
        }
        let wildcard = rest == "*";
        match kind {
            'u' if wildcard => Ok(AnyUser),
            'u' => Ok(ExactUser(parse_number(rest)?)),
            'g' if wildcard => Ok(AnyGroup),
            'g' => Ok(ExactGroup(parse_number(rest)?)),
            'f' if wildcard => Ok(AnyFriend),
            'f' => Ok(ExactFriend(parse_number(rest)?)),
            's' if wildcard => Ok(AnyStranger),
            's' => Ok(ExactStranger(parse_number(rest)?)),
            'm' if wildcard => Ok(AnyMemberFromAnyGroup),
            'm' => parse_grouped(rest, s, AnyMember, ExactMember),
            't' if wildcard => Ok(AnyTempFromAnyGroup),
            't' => parse_grouped(rest, s, AnyTemp, ExactTemp),
            _ => Err(PermitteeIdError::Malformed(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PermitteeId::*;

    fn every_variant() -> Vec<PermitteeId> {
        vec![
            Console,
            AnyContact,
            AnyUser,
            ExactUser(123456),
            AnyFriend,
            ExactFriend(42),
            AnyGroup,
            ExactGroup(123456),
            AnyMemberFromAnyGroup,
            AnyMember(1),
            ExactMember(123456, 789),
            AnyTempFromAnyGroup,
            AnyTemp(9),
            ExactTemp(9, 10),
            AnyStranger,
            ExactStranger(77),
        ]
    }

    #[test]
    fn test_round_trip_every_variant() {
        for id in every_variant() {
            assert_eq!(id.as_string().parse::<PermitteeId>().unwrap(), id, "{}", id);
        }
    }

    #[test]
    fn test_canonical_strings() {
        assert_eq!(ExactGroup(123456).as_string(), "g123456");
        assert_eq!(ExactMember(123456, 789).as_string(), "m123456.789");
        assert_eq!(AnyContact.as_string(), "*");
        assert_eq!(AnyMember(5).as_string(), "m5.*");
        assert_eq!(ExactTemp(1, 2).as_string(), "t1.2");
    }

    #[test]
    fn test_parse_is_case_insensitive_on_kind() {
        assert_eq!("G123".parse::<PermitteeId>().unwrap(), ExactGroup(123));
        assert_eq!("CONSOLE".parse::<PermitteeId>().unwrap(), Console);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<PermitteeId>().is_err());
        assert!("x1".parse::<PermitteeId>().is_err());
        assert!("u".parse::<PermitteeId>().is_err());
        assert!("uabc".parse::<PermitteeId>().is_err());
        assert!("m12".parse::<PermitteeId>().is_err());
        assert!("m12.x".parse::<PermitteeId>().is_err());
    }

    #[test]
    fn test_exact_member_is_dual_rooted() {
        let parents = ExactMember(1, 2).all_parents();
        assert!(parents.contains(&AnyMember(1)));
        assert!(parents.contains(&ExactUser(2)));
        assert!(parents.contains(&AnyMemberFromAnyGroup));
        assert!(parents.contains(&AnyUser));
        assert!(parents.contains(&AnyContact));
        assert!(!parents.contains(&ExactMember(1, 2)));
    }

    #[test]
    fn test_closure_deduplicates() {
        // AnyUser is reachable through both AnyMember and ExactUser
        let all = ExactTemp(3, 4).all_parents_with_self();
        let unique: HashSet<_> = all.iter().collect();
        assert_eq!(unique.len(), all.len());
        assert_eq!(all[0], ExactTemp(3, 4));
    }

    #[test]
    fn test_roots_have_no_parents() {
        assert!(Console.direct_parents().is_empty());
        assert!(AnyContact.direct_parents().is_empty());
        assert!(!Console.has_child(&ExactUser(1)));
    }

    #[test]
    fn test_has_child() {
        assert!(ExactGroup(1).has_child(&AnyGroup));
        assert!(ExactFriend(1).has_child(&AnyContact));
        assert!(ExactMember(1, 2).has_child(&ExactUser(2)));
        assert!(ExactUser(2).has_child(&ExactUser(2)));
        assert!(!AnyGroup.has_child(&ExactGroup(1)));
        assert!(!ExactUser(1).has_child(&AnyGroup));
    }

    struct Member(u64, u64);

    impl Permittee for Member {
        fn permittee_id(&self) -> PermitteeId {
            ExactMember(self.0, self.1)
        }
    }

    struct Everyone;

    impl Permittee for Everyone {
        fn permittee_id(&self) -> PermitteeId {
            AnyContact
        }
    }

    #[test]
    fn test_has_child_on_permittee_trait() {
        assert!(Member(1, 2).has_child(&Everyone));
        assert!(!Everyone.has_child(&Member(1, 2)));
    }
}
