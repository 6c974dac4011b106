//! Study-group membership rules.
//!
//! Handlers load a [`GroupAccess`] snapshot from the store and ask these
//! functions what the caller may do; the functions never touch the database.

use rand::Rng;

pub const ACCESS_CODE_LEN: usize = 6;
const ACCESS_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

pub const ROLE_CREATOR: &str = "creator";
pub const ROLE_MEMBER: &str = "member";

pub fn generate_access_code() -> String {
    let mut rng = rand::thread_rng();
    (0..ACCESS_CODE_LEN)
        .map(|_| ACCESS_CODE_ALPHABET[rng.gen_range(0..ACCESS_CODE_ALPHABET.len())] as char)
        .collect()
}

#[derive(Debug, Clone)]
pub struct GroupAccess {
    pub creator_id: String,
    pub is_private: bool,
    pub max_members: i64,
    pub access_code: Option<String>,
    pub members: Vec<String>,
}

impl GroupAccess {
    pub fn is_member(&self, user_id: &str) -> bool {
        self.members.iter().any(|m| m == user_id)
    }

    pub fn is_creator(&self, user_id: &str) -> bool {
        self.creator_id == user_id
    }

    pub fn is_full(&self) -> bool {
        self.members.len() as i64 >= self.max_members
    }

    /// Public groups are readable by anyone; private ones only by members.
    pub fn can_view(&self, user_id: &str) -> bool {
        !self.is_private || self.is_member(user_id)
    }

    /// The access code is only ever shown to the creator.
    pub fn visible_access_code(&self, user_id: &str) -> Option<&str> {
        if self.is_private && !self.is_creator(user_id) {
            return None;
        }
        self.access_code.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    AlreadyMember,
    Full,
    InvalidAccessCode,
    NotMember,
    CreatorWithMembers,
    NotCreator,
}

impl Denial {
    pub fn message(&self) -> &'static str {
        match self {
            Denial::AlreadyMember => "Already a member of this group",
            Denial::Full => "Group is at maximum capacity",
            Denial::InvalidAccessCode => "Invalid access code",
            Denial::NotMember => "Not a member of this group",
            Denial::CreatorWithMembers => {
                "Group creator cannot leave while there are other members. Transfer ownership first."
            }
            Denial::NotCreator => "Only the group creator can delete this group",
        }
    }
}

/// Joining by group id: membership, then capacity, then the private-group code.
pub fn check_join(
    group: &GroupAccess,
    user_id: &str,
    access_code: Option<&str>,
) -> Result<(), Denial> {
    if group.is_member(user_id) {
        return Err(Denial::AlreadyMember);
    }
    if group.is_full() {
        return Err(Denial::Full);
    }
    if group.is_private {
        let supplied = access_code.map(str::trim).filter(|s| !s.is_empty());
        match (supplied, group.access_code.as_deref()) {
            (Some(given), Some(expected)) if given.eq_ignore_ascii_case(expected) => {}
            _ => return Err(Denial::InvalidAccessCode),
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeJoin {
    Join,
    AlreadyMember,
}

/// Joining by access code: the code already matched, so only capacity matters.
/// Existing members get a successful no-op.
pub fn check_join_by_code(group: &GroupAccess, user_id: &str) -> Result<CodeJoin, Denial> {
    if group.is_member(user_id) {
        return Ok(CodeJoin::AlreadyMember);
    }
    if group.is_full() {
        return Err(Denial::Full);
    }
    Ok(CodeJoin::Join)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    Left,
    LeftAndDeleted,
}

pub fn check_leave(group: &GroupAccess, user_id: &str) -> Result<LeaveOutcome, Denial> {
    if !group.is_member(user_id) {
        return Err(Denial::NotMember);
    }
    if group.is_creator(user_id) {
        if group.members.len() > 1 {
            return Err(Denial::CreatorWithMembers);
        }
        return Ok(LeaveOutcome::LeftAndDeleted);
    }
    Ok(LeaveOutcome::Left)
}

pub fn check_delete(group: &GroupAccess, user_id: &str) -> Result<(), Denial> {
    if !group.is_creator(user_id) {
        return Err(Denial::NotCreator);
    }
    Ok(())
}

/// Posting, uploading, scheduling and attending require membership even in public groups.
pub fn check_contribute(group: &GroupAccess, user_id: &str) -> Result<(), Denial> {
    if !group.is_member(user_id) {
        return Err(Denial::NotMember);
    }
    Ok(())
}
