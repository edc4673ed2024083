use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::authz::Policy;
use crate::models::user::Principal;

/// Publication state, stored as lowercase text in the `status` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum BlogStatus {
    Draft,
    Published,
    Unpublished,
}

impl BlogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlogStatus::Draft => "draft",
            BlogStatus::Published => "published",
            BlogStatus::Unpublished => "unpublished",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Blog {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub meta: String,
    pub tags: Vec<String>,
    pub status: BlogStatus,
    pub image_link: Option<String>,
    pub image_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Blog {
    pub fn is_owned_by(&self, who: &Principal) -> bool {
        self.user_id == who.id
    }
}

/// Everything a caller can do to a blog post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlogAction {
    Create,
    Read,
    ReadAll,
    Update,
    UpdateStatus,
    Destroy,
}

/// Capability rules for blog posts.
///
/// Staff (admin, editor) act on any post. Everyone else is scoped to their
/// own posts, with one extra gate: only staff may move a post into
/// `published`. Owners park their posts in any other state.
pub struct BlogPolicy;

impl BlogPolicy {
    fn staff_or_owner(who: &Principal, blog: &Blog) -> bool {
        who.is_staff() || blog.is_owned_by(who)
    }

    fn update_status(who: &Principal, blog: &Blog, target: BlogStatus) -> bool {
        if who.is_staff() {
            return true;
        }
        blog.is_owned_by(who) && target != BlogStatus::Published
    }
}

impl Policy for BlogPolicy {
    type Resource = Blog;
    type Action = BlogAction;
    type Patch = BlogStatus;

    fn allows(
        &self,
        who: &Principal,
        action: Self::Action,
        resource: Option<&Self::Resource>,
        patch: Option<&Self::Patch>,
    ) -> bool {
        match (action, resource, patch) {
            // any authenticated principal may write or list
            (BlogAction::Create, _, _) => true,
            (BlogAction::ReadAll, _, _) => true,
            (BlogAction::Read, Some(blog), _) => Self::staff_or_owner(who, blog),
            (BlogAction::Update, Some(blog), _) => Self::staff_or_owner(who, blog),
            (BlogAction::Destroy, Some(blog), _) => Self::staff_or_owner(who, blog),
            (BlogAction::UpdateStatus, Some(blog), Some(target)) => {
                Self::update_status(who, blog, *target)
            }
            _ => false,
        }
    }
}

/// Slug = lowercased title with runs of non-alphanumerics collapsed to a
/// single dash, plus a random 8-hex suffix so retitled reposts never
/// collide.
pub fn generate_slug(title: &str) -> String {
    let mut slug = String::with_capacity(title.len() + 9);
    let mut dash_pending = false;
    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            if dash_pending && !slug.is_empty() {
                slug.push('-');
            }
            dash_pending = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            dash_pending = true;
        }
    }

    let mut suffix = [0u8; 4];
    rand::thread_rng().fill_bytes(&mut suffix);
    if slug.is_empty() {
        hex::encode(suffix)
    } else {
        format!("{}-{}", slug, hex::encode(suffix))
    }
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::authorize;
    use crate::models::user::{AccountStatus, Role};

    fn principal(role: Role) -> Principal {
        Principal {
            id: Uuid::new_v4(),
            email: "t@example.com".into(),
            role,
            status: AccountStatus::Active,
        }
    }

    fn blog_of(owner: &Principal, status: BlogStatus) -> Blog {
        Blog {
            id: Uuid::new_v4(),
            user_id: owner.id,
            title: "T".into(),
            slug: "t-00000000".into(),
            content: "c".into(),
            meta: "m".into(),
            tags: vec![],
            status,
            image_link: None,
            image_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_create_allows_any_authenticated() {
        for role in [Role::Admin, Role::Editor, Role::User] {
            let who = principal(role);
            assert!(authorize(&BlogPolicy, &who, BlogAction::Create, None, None).is_ok());
        }
    }

    #[test]
    fn test_read_all_allows_any_authenticated() {
        let who = principal(Role::User);
        assert!(authorize(&BlogPolicy, &who, BlogAction::ReadAll, None, None).is_ok());
    }

    #[test]
    fn test_owner_reads_updates_destroys_own_post() {
        let owner = principal(Role::User);
        let blog = blog_of(&owner, BlogStatus::Draft);
        for action in [BlogAction::Read, BlogAction::Update, BlogAction::Destroy] {
            assert!(authorize(&BlogPolicy, &owner, action, Some(&blog), None).is_ok());
        }
    }

    #[test]
    fn test_stranger_denied_on_foreign_post() {
        let owner = principal(Role::User);
        let stranger = principal(Role::User);
        let blog = blog_of(&owner, BlogStatus::Published);
        for action in [BlogAction::Read, BlogAction::Update, BlogAction::Destroy] {
            assert!(authorize(&BlogPolicy, &stranger, action, Some(&blog), None).is_err());
        }
        assert!(authorize(
            &BlogPolicy,
            &stranger,
            BlogAction::UpdateStatus,
            Some(&blog),
            Some(&BlogStatus::Draft)
        )
        .is_err());
    }

    #[test]
    fn test_staff_act_on_foreign_posts() {
        let owner = principal(Role::User);
        let blog = blog_of(&owner, BlogStatus::Draft);
        for role in [Role::Admin, Role::Editor] {
            let staff = principal(role);
            for action in [BlogAction::Read, BlogAction::Update, BlogAction::Destroy] {
                assert!(authorize(&BlogPolicy, &staff, action, Some(&blog), None).is_ok());
            }
            assert!(authorize(
                &BlogPolicy,
                &staff,
                BlogAction::UpdateStatus,
                Some(&blog),
                Some(&BlogStatus::Published)
            )
            .is_ok());
        }
    }

    #[test]
    fn test_owner_moves_own_post_to_any_unpublished_state() {
        let owner = principal(Role::User);
        let blog = blog_of(&owner, BlogStatus::Published);
        for target in [BlogStatus::Draft, BlogStatus::Unpublished] {
            assert!(authorize(
                &BlogPolicy,
                &owner,
                BlogAction::UpdateStatus,
                Some(&blog),
                Some(&target)
            )
            .is_ok());
        }
    }

    #[test]
    fn test_only_staff_publish() {
        let owner = principal(Role::User);
        let blog = blog_of(&owner, BlogStatus::Draft);
        let err = authorize(
            &BlogPolicy,
            &owner,
            BlogAction::UpdateStatus,
            Some(&blog),
            Some(&BlogStatus::Published),
        )
        .unwrap_err();
        assert!(matches!(err, crate::errors::AppError::Forbidden));

        let editor = principal(Role::Editor);
        assert!(authorize(
            &BlogPolicy,
            &editor,
            BlogAction::UpdateStatus,
            Some(&blog),
            Some(&BlogStatus::Published)
        )
        .is_ok());
    }

    #[test]
    fn test_missing_resource_or_patch_denies() {
        let who = principal(Role::Admin);
        assert!(authorize(&BlogPolicy, &who, BlogAction::Read, None, None).is_err());
        // no target status to judge, fail closed
        let owner = principal(Role::User);
        let blog = blog_of(&owner, BlogStatus::Draft);
        assert!(
            authorize(&BlogPolicy, &owner, BlogAction::UpdateStatus, Some(&blog), None).is_err()
        );
    }

    #[test]
    fn test_slug_shape() {
        let slug = generate_slug("Hello, World! Rust & Tokio");
        let (body, suffix) = slug.rsplit_once('-').unwrap();
        assert_eq!(body, "hello-world-rust-tokio");
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_slug_of_symbol_only_title_is_just_suffix() {
        let slug = generate_slug("!!!");
        assert_eq!(slug.len(), 8);
    }

    #[test]
    fn test_slugs_do_not_collide() {
        assert_ne!(generate_slug("Same Title"), generate_slug("Same Title"));
    }
}
