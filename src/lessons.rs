/// A built-in lesson: the prompt that opens it and the challenge shown afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Lesson {
    pub title: &'static str,
    pub start_prompt: &'static str,
    pub challenge: &'static str,
    /// Seed progress only; nothing is persisted.
    pub progress: f32,
}

static CATALOG: [Lesson; 4] = [
    Lesson {
        title: "Input Validation",
        start_prompt: "You are a security-focused instructor. Teach the student about **input validation** \
            in web applications. Explain why it matters, common pitfalls (e.g., SQLi, XSS), \
            and give a short Python/Flask example of safe validation using `werkzeug` utilities.",
        challenge: "Write a Flask route `/login` that safely validates a username (alphanumeric, \
            3-20 chars) and a password (at least 8 chars, one uppercase, one digit). \
            Return JSON `{'status': 'valid'}` or `{'status': 'invalid', 'errors': [...]}`.",
        progress: 1.0,
    },
    Lesson {
        title: "Auth & Sessions",
        start_prompt: "You are a security instructor. Explain **authentication** and **session management**. \
            Cover password hashing (bcrypt/argon2), secure cookies, session fixation, \
            and how Flask-Login or Django's auth system helps.",
        challenge: "Implement a secure login endpoint in Flask that hashes the password with bcrypt, \
            stores the user ID in a HttpOnly, Secure, SameSite=Strict session cookie, \
            and returns a JSON Web Token (JWT) for subsequent API calls.",
        progress: 0.5,
    },
    Lesson {
        title: "Access Control",
        start_prompt: "You are a security teacher. Walk the student through **access control** (RBAC/ABAC). \
            Show why checking permissions on every request matters, \
            and demonstrate a simple decorator in Flask that enforces role-based checks.",
        challenge: "Create a `@require_role('admin')` decorator. \
            Apply it to a `/users` endpoint that lists all users only for admins. \
            Non-admins should receive `403 Forbidden`.",
        progress: 0.25,
    },
    Lesson {
        title: "Error Handling",
        start_prompt: "You are a security instructor. Teach **secure error handling**. \
            Explain why stack traces must never leak to users, how to log errors safely, \
            and how to return generic but helpful messages.",
        challenge: "In a Flask app, register a global error handler for `500` errors. \
            Log the exception with `logging.exception`, return JSON `{'error': 'Internal Server Error'}`, \
            and ensure the response never contains traceback data.",
        progress: 0.0,
    },
];

pub fn catalog() -> &'static [Lesson] {
    &CATALOG
}

/// Lesson by 1-based position, as shown in `chatbox lessons`.
pub fn by_number(number: usize) -> Option<&'static Lesson> {
    number.checked_sub(1).and_then(|idx| CATALOG.get(idx))
}

/// First lesson not yet complete, for "continue learning".
pub fn next_incomplete() -> Option<&'static Lesson> {
    CATALOG.iter().find(|lesson| lesson.progress < 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_one_based() {
        assert_eq!(by_number(1).map(|l| l.title), Some("Input Validation"));
        assert_eq!(by_number(4).map(|l| l.title), Some("Error Handling"));
        assert!(by_number(0).is_none());
        assert!(by_number(5).is_none());
    }

    #[test]
    fn test_next_incomplete_skips_finished() {
        assert_eq!(next_incomplete().map(|l| l.title), Some("Auth & Sessions"));
    }

    #[test]
    fn test_catalog_is_well_formed() {
        for lesson in catalog() {
            assert!(!lesson.start_prompt.trim().is_empty());
            assert!(!lesson.challenge.trim().is_empty());
            assert!((0.0..=1.0).contains(&lesson.progress));
        }
    }
}
