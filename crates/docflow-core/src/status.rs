//! Per-row lifecycle status and the actions each status offers.

use std::fmt;

use crate::model::{Document, FileUser};

/// Where a document sits in the signing workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowStatus {
    /// Not yet signed; `recipient` is set once a sign-capable grant exists.
    PendingSignature { recipient: Option<String> },
    Signed,
    Rejected { reason: String },
}

/// A user-triggered action on a list row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowAction {
    Send,
    Sign,
    Reject,
}

impl RowAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Send => "send",
            Self::Sign => "sign",
            Self::Reject => "reject",
        }
    }
}

impl fmt::Display for RowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl RowStatus {
    /// Derive the status of a document from its flags and its grant list.
    /// A signature wins over a rejection.
    pub fn of(doc: &Document, grants: &[FileUser]) -> Self {
        if doc.is_signed {
            return Self::Signed;
        }
        if let Some(reason) = &doc.rejected_reason {
            return Self::Rejected {
                reason: reason.clone(),
            };
        }
        Self::PendingSignature {
            recipient: recipient(grants),
        }
    }

    /// Actions available in this status.
    pub fn actions(&self) -> &'static [RowAction] {
        match self {
            Self::PendingSignature { recipient: None } => &[RowAction::Send],
            Self::PendingSignature { recipient: Some(_) } => &[RowAction::Sign, RowAction::Reject],
            Self::Signed | Self::Rejected { .. } => &[],
        }
    }

    pub fn allows(&self, action: RowAction) -> bool {
        self.actions().contains(&action)
    }

    /// Whether the document reached a terminal state.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Signed | Self::Rejected { .. })
    }
}

/// The document was sent to the first grantee allowed to sign it.
pub fn recipient(grants: &[FileUser]) -> Option<String> {
    grants
        .iter()
        .find(|g| g.may_sign() && !g.email.trim().is_empty())
        .map(|g| g.email.clone())
}

impl fmt::Display for RowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PendingSignature { recipient: None } => f.write_str("pending signature"),
            Self::PendingSignature {
                recipient: Some(to),
            } => write!(f, "awaiting signature from {to}"),
            Self::Signed => f.write_str("signed"),
            Self::Rejected { reason } => write!(f, "rejected: {reason}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DocumentId, Owner, UserId};

    fn doc() -> Document {
        Document {
            id: DocumentId::from("1"),
            original_filename: "contract.pdf".to_owned(),
            upload_date: "2024-05-01T10:00:00Z".to_owned(),
            is_signed: false,
            owner: Owner {
                id: UserId::from("1"),
                email: "owner@example.com".to_owned(),
                full_name: None,
                is_active: true,
            },
            size: None,
            rejected_reason: None,
        }
    }

    fn grant(email: &str, can_sign: bool) -> FileUser {
        FileUser {
            user_id: UserId::from(email),
            email: email.to_owned(),
            full_name: None,
            can_view: true,
            can_sign,
            access_level: None,
        }
    }

    #[test]
    fn fresh_document_offers_send_only() {
        let status = doc().status(&[]);
        assert_eq!(status, RowStatus::PendingSignature { recipient: None });
        assert_eq!(status.actions(), &[RowAction::Send]);
    }

    #[test]
    fn sign_grant_makes_document_sent() {
        let status = doc().status(&[grant("b@example.com", true)]);
        assert_eq!(
            status,
            RowStatus::PendingSignature {
                recipient: Some("b@example.com".to_owned())
            }
        );
        assert!(status.allows(RowAction::Sign));
        assert!(status.allows(RowAction::Reject));
        assert!(!status.allows(RowAction::Send));
    }

    #[test]
    fn view_only_grants_do_not_count_as_sent() {
        let grants = [grant("viewer@example.com", false), grant("  ", true)];
        assert_eq!(doc().status(&grants).actions(), &[RowAction::Send]);

        let grants = [grant("viewer@example.com", false), grant("b@example.com", true)];
        assert_eq!(recipient(&grants).as_deref(), Some("b@example.com"));
    }

    #[test]
    fn final_states_offer_nothing() {
        let grants = [grant("b@example.com", true)];

        let mut signed = doc();
        signed.is_signed = true;
        signed.rejected_reason = Some("late".to_owned());
        assert_eq!(signed.status(&grants), RowStatus::Signed);
        assert!(signed.status(&grants).actions().is_empty());

        let mut rejected = doc();
        rejected.rejected_reason = Some("wrong totals".to_owned());
        let status = rejected.status(&grants);
        assert!(status.is_final());
        assert!(status.actions().is_empty());
        assert_eq!(status.to_string(), "rejected: wrong totals");
    }
}
