//! Eligibility policy — decides whether an email warrants an automated
//! reply.
//!
//! Pure predicate over a normalized [`EmailRecord`]; no I/O. Rules apply
//! in a fixed order and the first rejecting rule wins:
//! - no-reply/noreply senders
//! - replies to our own outbound mail (loop prevention)
//! - mailing-list traffic (List-Id present)
//! - opt-out markers in the subject

use regex::Regex;
use tracing::debug;

use crate::pipeline::types::EmailRecord;

/// Subject markers that opt a message out of automated handling.
const OPT_OUT_MARKERS: [&str; 3] = ["no-auto-reply", "no-auto", "human-only"];

/// Why an email was rejected by the filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Sender contains "no-reply" or "noreply".
    NoReplySender,
    /// A reply-prefixed subject from our own address — answering it
    /// would start a reply loop.
    OwnReply,
    /// List-Id present: mailing-list traffic.
    MailingList,
    /// Subject carries an opt-out marker such as "no-auto-reply".
    OptOutSubject,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoReplySender => write!(f, "no-reply sender"),
            Self::OwnReply => write!(f, "reply from own address"),
            Self::MailingList => write!(f, "mailing-list traffic"),
            Self::OptOutSubject => write!(f, "opt-out marker in subject"),
        }
    }
}

/// Eligibility filter for automated replies.
pub struct EligibilityFilter {
    own_address: String,
    reply_prefix: Regex,
}

impl EligibilityFilter {
    /// Build a filter for the mailbox at `own_address` (used for reply
    /// loop detection).
    pub fn new(own_address: &str) -> Self {
        Self {
            own_address: own_address.to_lowercase(),
            // Prefix match only: "Re: re: ..." deep in a subject line is
            // still a reply, but "Prefer: ..." is not.
            reply_prefix: Regex::new(r"(?i)^\s*(re:|fwd:)").unwrap(),
        }
    }

    /// Evaluate the ordered rules; returns the first rejection, or `None`
    /// when the email qualifies for an automated reply.
    pub fn evaluate(&self, email: &EmailRecord) -> Option<RejectReason> {
        let sender = email.sender.to_lowercase();
        let subject = email.subject.to_lowercase();

        if sender.contains("no-reply") || sender.contains("noreply") {
            debug!(id = %email.id, sender = %email.sender, "Rejected: no-reply sender");
            return Some(RejectReason::NoReplySender);
        }

        // A reply-looking subject rejects only when it came from us. A
        // genuine reply from someone else may still need a response.
        if self.reply_prefix.is_match(&email.subject) && sender.contains(&self.own_address) {
            debug!(id = %email.id, sender = %email.sender, "Rejected: reply from own address");
            return Some(RejectReason::OwnReply);
        }

        if email.list_id.as_deref().is_some_and(|l| !l.is_empty()) {
            debug!(id = %email.id, "Rejected: mailing-list traffic");
            return Some(RejectReason::MailingList);
        }

        if OPT_OUT_MARKERS.iter().any(|m| subject.contains(m)) {
            debug!(id = %email.id, subject = %email.subject, "Rejected: opt-out subject");
            return Some(RejectReason::OptOutSubject);
        }

        None
    }

    /// True when no rule rejects the email.
    pub fn is_eligible(&self, email: &EmailRecord) -> bool {
        self.evaluate(email).is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWN: &str = "assistant@company.com";

    fn make_email(sender: &str, subject: &str, list_id: Option<&str>) -> EmailRecord {
        EmailRecord {
            id: "test-1".into(),
            thread_id: "test-1".into(),
            sender: sender.into(),
            recipient: OWN.into(),
            subject: subject.into(),
            body: "Hello".into(),
            date: "".into(),
            list_id: list_id.map(String::from),
            message_id: None,
        }
    }

    #[test]
    fn rejects_noreply_sender() {
        let filter = EligibilityFilter::new(OWN);
        let msg = make_email("noreply@service.io", "Your account", None);
        assert_eq!(filter.evaluate(&msg), Some(RejectReason::NoReplySender));
    }

    #[test]
    fn rejects_no_dash_reply_sender() {
        let filter = EligibilityFilter::new(OWN);
        let msg = make_email("no-reply@service.io", "Update", None);
        assert_eq!(filter.evaluate(&msg), Some(RejectReason::NoReplySender));
    }

    #[test]
    fn rejects_noreply_any_case() {
        let filter = EligibilityFilter::new(OWN);
        let msg = make_email("NoReply@Service.io", "Update", None);
        assert!(!filter.is_eligible(&msg));
    }

    #[test]
    fn rejects_reply_from_own_address() {
        let filter = EligibilityFilter::new(OWN);
        let msg = make_email("assistant@company.com", "Re: Your question", None);
        assert_eq!(filter.evaluate(&msg), Some(RejectReason::OwnReply));
    }

    #[test]
    fn rejects_fwd_from_own_address() {
        let filter = EligibilityFilter::new(OWN);
        let msg = make_email("Assistant@Company.COM", "FWD: meeting notes", None);
        assert_eq!(filter.evaluate(&msg), Some(RejectReason::OwnReply));
    }

    #[test]
    fn accepts_reply_from_someone_else() {
        // A reply-looking email from another party may be a genuine
        // reply requiring a response.
        let filter = EligibilityFilter::new(OWN);
        let msg = make_email("boss@company.com", "Re: Q3 report", None);
        assert!(filter.is_eligible(&msg));
    }

    #[test]
    fn reply_prefix_is_prefix_only() {
        let filter = EligibilityFilter::new(OWN);
        let msg = make_email("assistant@company.com", "Regarding lunch", None);
        // "Regarding" is not "Re: " — own sender alone does not reject.
        assert!(filter.is_eligible(&msg));
    }

    #[test]
    fn rejects_mailing_list() {
        let filter = EligibilityFilter::new(OWN);
        let msg = make_email(
            "newsletter@co.com",
            "Weekly Digest",
            Some("newsletter.co.com"),
        );
        assert_eq!(filter.evaluate(&msg), Some(RejectReason::MailingList));
    }

    #[test]
    fn empty_list_id_does_not_reject() {
        let filter = EligibilityFilter::new(OWN);
        let msg = make_email("boss@co.com", "Question", Some(""));
        assert!(filter.is_eligible(&msg));
    }

    #[test]
    fn rejects_opt_out_subjects() {
        let filter = EligibilityFilter::new(OWN);
        for subject in [
            "Please read [no-auto-reply]",
            "NO-AUTO: quarterly numbers",
            "human-only request",
        ] {
            let msg = make_email("boss@co.com", subject, None);
            assert_eq!(
                filter.evaluate(&msg),
                Some(RejectReason::OptOutSubject),
                "subject: {subject}"
            );
        }
    }

    #[test]
    fn accepts_plain_question() {
        let filter = EligibilityFilter::new(OWN);
        let msg = make_email("boss@co.com", "Question", None);
        assert!(filter.is_eligible(&msg));
    }

    #[test]
    fn noreply_wins_over_other_fields() {
        // Rule order is the defined tie-break: no-reply sender is checked
        // before the mailing-list rule.
        let filter = EligibilityFilter::new(OWN);
        let msg = make_email("noreply@lists.co.com", "Re: digest", Some("lists.co.com"));
        assert_eq!(filter.evaluate(&msg), Some(RejectReason::NoReplySender));
    }

    #[test]
    fn own_reply_wins_over_mailing_list() {
        let filter = EligibilityFilter::new(OWN);
        let msg = make_email(
            "assistant@company.com",
            "Re: announcement",
            Some("lists.co.com"),
        );
        assert_eq!(filter.evaluate(&msg), Some(RejectReason::OwnReply));
    }

    #[test]
    fn reject_reason_display() {
        assert_eq!(RejectReason::NoReplySender.to_string(), "no-reply sender");
        assert_eq!(
            RejectReason::MailingList.to_string(),
            "mailing-list traffic"
        );
    }
}
