use serde::Serialize;
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use uuid::Uuid;

const HASH_SCHEME: &str = "pbkdf2_sha256";
const KEY_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Admin,
    Rectorat,
    Finance,
    Academic,
    Professor,
    Student,
    Staff,
}

impl Role {
    pub const ALL: [&'static str; 7] = [
        "ADMIN",
        "RECTORAT",
        "FINANCE",
        "ACADEMIC",
        "PROFESSOR",
        "STUDENT",
        "STAFF",
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ADMIN" => Some(Self::Admin),
            "RECTORAT" => Some(Self::Rectorat),
            "FINANCE" => Some(Self::Finance),
            "ACADEMIC" => Some(Self::Academic),
            "PROFESSOR" => Some(Self::Professor),
            "STUDENT" => Some(Self::Student),
            "STAFF" => Some(Self::Staff),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::Rectorat => "RECTORAT",
            Self::Finance => "FINANCE",
            Self::Academic => "ACADEMIC",
            Self::Professor => "PROFESSOR",
            Self::Student => "STUDENT",
            Self::Staff => "STAFF",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Admin => "Administrateur Système",
            Self::Rectorat => "Rectorat/Direction",
            Self::Finance => "Service Financier",
            Self::Academic => "Service Académique/Secrétariat",
            Self::Professor => "Professeur/Enseignant",
            Self::Student => "Étudiant",
            Self::Staff => "Personnel Support",
        }
    }
}

/// Coarse functional perimeters; each method is gated on one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleGroup {
    Management,
    Academic,
    Finance,
    AllStaff,
}

impl RoleGroup {
    pub fn roles(self) -> &'static [Role] {
        match self {
            Self::Management => &[Role::Admin, Role::Rectorat],
            Self::Academic => &[Role::Admin, Role::Rectorat, Role::Academic, Role::Professor],
            Self::Finance => &[Role::Admin, Role::Rectorat, Role::Finance],
            Self::AllStaff => &[
                Role::Admin,
                Role::Rectorat,
                Role::Academic,
                Role::Professor,
                Role::Finance,
                Role::Staff,
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub is_superuser: bool,
}

impl SessionUser {
    pub fn full_name(&self) -> String {
        if !self.first_name.is_empty() && !self.last_name.is_empty() {
            format!("{} {}", self.first_name, self.last_name)
        } else {
            self.email.clone()
        }
    }
}

pub fn has_role_permission(user: &SessionUser, group: RoleGroup) -> bool {
    user.is_superuser || group.roles().contains(&user.role)
}

fn digest(password: &str, salt: &str, iterations: u32) -> String {
    let mut key = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt.as_bytes(), iterations, &mut key);
    key.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Encoded as `pbkdf2_sha256$<iterations>$<salt>$<hex key>`.
pub fn hash_password(password: &str, iterations: u32) -> String {
    let iterations = iterations.max(1);
    let salt = Uuid::new_v4().simple().to_string();
    let hex = digest(password, &salt, iterations);
    format!("{}${}${}${}", HASH_SCHEME, iterations, salt, hex)
}

pub fn verify_password(password: &str, encoded: &str) -> bool {
    let mut parts = encoded.splitn(4, '$');
    let (Some(scheme), Some(iterations), Some(salt), Some(expected)) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    if scheme != HASH_SCHEME {
        return false;
    }
    let Ok(iterations) = iterations.parse::<u32>() else {
        return false;
    };
    let actual = digest(password, salt, iterations.max(1));
    actual.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// Lowercases the domain part only, like the usual email normalization.
pub fn normalize_email(email: &str) -> String {
    let email = email.trim();
    match email.rsplit_once('@') {
        Some((local, domain)) => format!("{}@{}", local, domain.to_lowercase()),
        None => email.to_string(),
    }
}
