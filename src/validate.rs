//! Shape checks run before any store mutation. Violations are collected per
//! field so the client can render them next to the offending input.

use crate::auth::{LoginRequest, RegisterRequest};
use crate::err::FieldError;
use crate::Error;

fn push(errors: &mut Vec<FieldError>, field: &'static str, message: &'static str) {
    errors.push(FieldError { field, message });
}

fn looks_like_email(value: &str) -> bool {
    let mut parts = value.splitn(2, '@');
    match (parts.next(), parts.next()) {
        (Some(local), Some(domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        _ => false,
    }
}

fn shorter_than(value: &str, min: usize) -> bool {
    value.chars().count() < min
}

pub fn validate_login(login: &LoginRequest) -> Result<(), Error> {
    let mut errors = Vec::new();
    if !looks_like_email(&login.email) {
        push(&mut errors, "email", "Please enter a valid email address");
    }
    if shorter_than(&login.password, 6) {
        push(&mut errors, "password", "Password must be at least 6 characters");
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::validation(errors))
    }
}

pub fn validate_register(register: &RegisterRequest) -> Result<(), Error> {
    let mut errors = Vec::new();
    if shorter_than(&register.name, 2) {
        push(&mut errors, "name", "Name must be at least 2 characters");
    }
    if !looks_like_email(&register.email) {
        push(&mut errors, "email", "Please enter a valid email address");
    }
    if shorter_than(&register.password, 6) {
        push(&mut errors, "password", "Password must be at least 6 characters");
    }
    if shorter_than(&register.phone, 10) {
        push(&mut errors, "phone", "Please enter a valid phone number");
    }
    if shorter_than(&register.college, 2) {
        push(&mut errors, "college", "College name is required");
    }
    if register.year_of_study.is_empty() {
        push(&mut errors, "yearOfStudy", "Year of study is required");
    }
    if shorter_than(&register.location, 2) {
        push(&mut errors, "location", "Location is required");
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::validation(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn good_register() -> RegisterRequest {
        RegisterRequest {
            name: "Jo".to_string(),
            email: "jo@x.com".to_string(),
            password: "secret1".to_string(),
            phone: "1234567890".to_string(),
            college: "X U".to_string(),
            year_of_study: "1".to_string(),
            location: "Town".to_string(),
        }
    }

    fn fields(err: Error) -> Vec<&'static str> {
        match err {
            Error::InvalidPayload { errors, .. } => errors.into_iter().map(|e| e.field).collect(),
            other => panic!("expected InvalidPayload, got {:?}", other),
        }
    }

    #[test]
    fn valid_register_passes() {
        assert!(validate_register(&good_register()).is_ok());
    }

    #[test]
    fn register_collects_every_violation() {
        let register = RegisterRequest {
            name: "J".to_string(),
            email: "not-an-email".to_string(),
            password: "short".to_string(),
            phone: "12345".to_string(),
            college: "".to_string(),
            year_of_study: "".to_string(),
            location: "".to_string(),
        };
        let failed = fields(validate_register(&register).unwrap_err());
        assert_eq!(
            failed,
            vec!["name", "email", "password", "phone", "college", "yearOfStudy", "location"]
        );
    }

    #[test]
    fn email_shape_is_checked() {
        for bad in ["", "jo", "jo@", "@x.com", "jo@x", "jo@.com", "jo@x.com."] {
            let mut register = good_register();
            register.email = bad.to_string();
            assert!(
                fields(validate_register(&register).unwrap_err()).contains(&"email"),
                "`{}` should be rejected",
                bad
            );
        }
        let mut register = good_register();
        register.email = "jo.smith@mail.example.org".to_string();
        assert!(validate_register(&register).is_ok());
    }

    #[test]
    fn login_requires_email_and_password_shape() {
        let login = LoginRequest {
            email: "jo@x.com".to_string(),
            password: "secret1".to_string(),
        };
        assert!(validate_login(&login).is_ok());

        let bad = LoginRequest {
            email: "nope".to_string(),
            password: "12345".to_string(),
        };
        assert_eq!(fields(validate_login(&bad).unwrap_err()), vec!["email", "password"]);
    }

    #[test]
    fn length_checks_count_characters_not_bytes() {
        let mut register = good_register();
        register.name = "Ål".to_string();
        assert!(validate_register(&register).is_ok());
    }
}
