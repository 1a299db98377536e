/// Institutional email policy: the domain itself or any subdomain of it.
#[derive(Debug, Clone)]
pub struct DomainGate {
    domain: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct DomainRejection {
    pub email: Option<String>,
    pub message: String,
}

impl DomainGate {
    pub fn new(domain: impl Into<String>) -> Self {
        let domain = domain.into();
        Self {
            domain: domain
                .trim()
                .trim_start_matches('@')
                .trim_start_matches('.')
                .to_ascii_lowercase(),
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn allows(&self, email: &str) -> bool {
        let email = email.trim().to_ascii_lowercase();
        let Some((local, domain)) = email.rsplit_once('@') else {
            return false;
        };
        if local.is_empty() || self.domain.is_empty() {
            return false;
        }
        domain == self.domain
            || domain
                .strip_suffix(self.domain.as_str())
                .is_some_and(|prefix| prefix.ends_with('.') && prefix.len() > 1)
    }

    pub fn check(&self, email: Option<&str>) -> Result<(), DomainRejection> {
        match email {
            Some(email) if self.allows(email) => Ok(()),
            _ => Err(DomainRejection {
                email: email.map(str::to_string),
                message: self.rejection_message(),
            }),
        }
    }

    pub fn rejection_message(&self) -> String {
        format!(
            "Only {} email addresses (including subdomains) are allowed to use this platform.",
            self.domain
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("student@nits.ac.in")]
    #[case("student@cs.nits.ac.in")]
    #[case("Student@CSE.NITS.AC.IN")]
    #[case("  prof@ece.dept.nits.ac.in ")]
    fn accepts_domain_and_subdomains(#[case] email: &str) {
        assert!(DomainGate::new("nits.ac.in").allows(email));
    }

    #[rstest]
    #[case("student@other.edu")]
    #[case("student@evilnits.ac.in")]
    #[case("student@nits.ac.in.evil.com")]
    #[case("@nits.ac.in")]
    #[case("nits.ac.in")]
    #[case("student@.nits.ac.in")]
    fn rejects_everything_else(#[case] email: &str) {
        assert!(!DomainGate::new("nits.ac.in").allows(email));
    }

    #[test]
    fn configured_domain_is_normalized() {
        let gate = DomainGate::new(" .NITS.ac.in");
        assert_eq!(gate.domain(), "nits.ac.in");
        assert!(gate.allows("a@nits.ac.in"));
    }

    #[test]
    fn missing_email_is_rejected() {
        let rejection = DomainGate::new("nits.ac.in").check(None).unwrap_err();
        assert_eq!(rejection.email, None);
        assert!(rejection.message.contains("nits.ac.in"));
    }
}
