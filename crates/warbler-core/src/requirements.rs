//! Requirement filter
//!
//! All constrained dimensions must pass; within `roles` holding any one of
//! the listed roles is enough.

use std::collections::HashSet;

use crate::context::MessageContext;
use crate::spec::Requirements;

/// Whether `context` satisfies every gate in `requirements`
pub fn permits(requirements: &Requirements, context: &MessageContext) -> bool {
    channel_allowed(requirements, context)
        && category_allowed(requirements, context)
        && has_a_role(requirements, context)
}

fn constraint(set: &Option<HashSet<String>>) -> Option<&HashSet<String>> {
    set.as_ref().filter(|s| !s.is_empty())
}

fn channel_allowed(requirements: &Requirements, context: &MessageContext) -> bool {
    let Some(channels) = constraint(&requirements.channels) else {
        return true;
    };
    channels.contains(&context.channel.id) || channels.contains(&context.channel.name)
}

fn category_allowed(requirements: &Requirements, context: &MessageContext) -> bool {
    let Some(categories) = constraint(&requirements.categories) else {
        return true;
    };
    context
        .channel
        .category
        .as_ref()
        .is_some_and(|category| categories.contains(category))
}

fn has_a_role(requirements: &Requirements, context: &MessageContext) -> bool {
    let Some(roles) = constraint(&requirements.roles) else {
        return true;
    };
    !roles.is_disjoint(&context.author.roles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Author, ChannelRef};

    fn message(roles: &[&str], channel: ChannelRef) -> MessageContext {
        MessageContext::new(
            "m1",
            "!ping",
            Author::new("u1").with_roles(roles.iter().copied()),
            channel,
        )
    }

    #[test]
    fn test_roles_need_at_least_one() {
        let req = Requirements::new().with_roles(["A", "B"]);
        let general = ChannelRef::new("c1", "general");

        assert!(permits(&req, &message(&["C", "A"], general.clone())));
        assert!(!permits(&req, &message(&["C"], general.clone())));
        assert!(!permits(&req, &message(&[], general)));
    }

    #[test]
    fn test_channels_match_id_or_name() {
        let req = Requirements::new().with_channels(["general", "c9"]);

        assert!(permits(&req, &message(&[], ChannelRef::new("c1", "general"))));
        assert!(permits(&req, &message(&[], ChannelRef::new("c9", "random"))));
        assert!(!permits(&req, &message(&[], ChannelRef::new("c2", "random"))));
    }

    #[test]
    fn test_category_required_but_absent() {
        let req = Requirements::new().with_categories(["Games"]);

        assert!(!permits(&req, &message(&[], ChannelRef::new("c1", "general"))));
        assert!(permits(
            &req,
            &message(&[], ChannelRef::new("c1", "general").in_category("Games"))
        ));
    }

    #[test]
    fn test_dimensions_are_anded() {
        let req = Requirements::new()
            .with_channels(["general"])
            .with_roles(["Mod"]);

        assert!(permits(&req, &message(&["Mod"], ChannelRef::new("c1", "general"))));
        assert!(!permits(&req, &message(&["Mod"], ChannelRef::new("c2", "other"))));
        assert!(!permits(&req, &message(&["User"], ChannelRef::new("c1", "general"))));
    }

    #[test]
    fn test_absent_or_empty_sets_are_unconstrained() {
        let empty = Requirements::new()
            .with_channels(Vec::<String>::new())
            .with_roles(Vec::<String>::new());

        assert!(permits(&Requirements::new(), &message(&[], ChannelRef::default())));
        assert!(permits(&empty, &message(&[], ChannelRef::default())));
    }
}
