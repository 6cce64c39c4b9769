// Recipient filter attached to PUBLISH and programmatic EVENT fan-out.
use courier_common::SessionId;
use std::collections::BTreeSet;

/// Which subscribers receive a fan-out.
///
/// Precedence per recipient: excluded-self, then the eligible allow-list,
/// then the exclude deny-list. Exclusion always wins over eligibility.
///
/// ```
/// use courier_common::SessionId;
/// use courier_wire::Eligibility;
///
/// let a = SessionId::from("a");
/// let b = SessionId::from("b");
/// let only_b = Eligibility::eligible_only([b.clone()]);
/// assert!(only_b.admits(&b, Some(&a)));
/// assert!(!only_b.admits(&a, Some(&a)));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Eligibility {
    pub exclude_me: bool,
    pub exclude: Option<BTreeSet<SessionId>>,
    pub eligible: Option<BTreeSet<SessionId>>,
}

impl Eligibility {
    pub fn everyone() -> Self {
        Self::default()
    }

    pub fn excluding_me() -> Self {
        Self {
            exclude_me: true,
            ..Self::default()
        }
    }

    pub fn excluding(ids: impl IntoIterator<Item = SessionId>) -> Self {
        Self {
            exclude: Some(ids.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn eligible_only(ids: impl IntoIterator<Item = SessionId>) -> Self {
        Self {
            eligible: Some(ids.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn with_exclude(mut self, ids: impl IntoIterator<Item = SessionId>) -> Self {
        self.exclude = Some(ids.into_iter().collect());
        self
    }

    pub fn with_eligible(mut self, ids: impl IntoIterator<Item = SessionId>) -> Self {
        self.eligible = Some(ids.into_iter().collect());
        self
    }

    pub fn is_unrestricted(&self) -> bool {
        !self.exclude_me && self.exclude.is_none() && self.eligible.is_none()
    }

    /// `publisher` is `None` for programmatic events, which have no "self".
    pub fn admits(&self, recipient: &SessionId, publisher: Option<&SessionId>) -> bool {
        if self.exclude_me && publisher == Some(recipient) {
            return false;
        }
        if let Some(eligible) = &self.eligible
            && !eligible.contains(recipient)
        {
            return false;
        }
        if let Some(exclude) = &self.exclude
            && exclude.contains(recipient)
        {
            return false;
        }
        true
    }
}
