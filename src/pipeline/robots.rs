//! Minimal robots.txt evaluation for the accessibility gate.
//!
//! Only the subset the gate needs: group the directives by user-agent, match
//! our robots user agent against them (falling back to `*`), and answer
//! "may we fetch this path". Allow rules take precedence over disallow, as
//! the de-facto standard specifies. Crawl-delay and sitemap directives are
//! ignored — the pipeline fetches exactly one page per invocation.

use std::collections::HashMap;

/// Parsed robots.txt rules, grouped by user-agent.
#[derive(Debug, Clone, Default)]
pub struct RobotsRules {
    groups: HashMap<String, Group>,
    wildcard: Group,
}

#[derive(Debug, Clone, Default)]
struct Group {
    disallow: Vec<String>,
    allow: Vec<String>,
}

impl RobotsRules {
    /// Parse robots.txt content. Unknown directives are skipped; a blank or
    /// unparsable file allows everything.
    pub fn parse(content: &str) -> Self {
        let mut rules = Self::default();
        let mut agents: Vec<String> = Vec::new();
        let mut group = Group::default();
        let mut group_open = false;

        let mut flush =
            |agents: &mut Vec<String>, group: &mut Group, rules: &mut RobotsRules| {
                for agent in agents.drain(..) {
                    if agent == "*" {
                        rules.wildcard = group.clone();
                    } else {
                        rules.groups.insert(agent, group.clone());
                    }
                }
                *group = Group::default();
            };

        for line in content.lines() {
            // Strip inline comments before trimming.
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }

            let Some((directive, value)) = line.split_once(':') else {
                continue;
            };
            let directive = directive.trim().to_lowercase();
            let value = value.trim();

            match directive.as_str() {
                "user-agent" => {
                    // A user-agent line after rule lines starts a new group.
                    if group_open {
                        flush(&mut agents, &mut group, &mut rules);
                        group_open = false;
                    }
                    agents.push(value.to_lowercase());
                }
                "disallow" => {
                    group_open = true;
                    if !value.is_empty() {
                        group.disallow.push(value.to_string());
                    }
                }
                "allow" => {
                    group_open = true;
                    if !value.is_empty() {
                        group.allow.push(value.to_string());
                    }
                }
                _ => {}
            }
        }
        flush(&mut agents, &mut group, &mut rules);

        rules
    }

    /// Whether `user_agent` may fetch `path`.
    pub fn is_allowed(&self, user_agent: &str, path: &str) -> bool {
        let agent = user_agent.to_lowercase();
        let group = self
            .groups
            .get(&agent)
            .or_else(|| {
                // Product tokens match on substring, e.g. "cardsmithbot/1.0"
                // matches a "cardsmithbot" group.
                self.groups
                    .iter()
                    .find(|(name, _)| agent.contains(name.as_str()))
                    .map(|(_, g)| g)
            })
            .unwrap_or(&self.wildcard);

        if group.allow.iter().any(|p| path.starts_with(p)) {
            return true;
        }
        !group.disallow.iter().any(|p| path.starts_with(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_allows_everything() {
        let rules = RobotsRules::parse("");
        assert!(rules.is_allowed("AnyBot", "/any/path"));
    }

    #[test]
    fn wildcard_disallow_applies_to_unknown_agents() {
        let rules = RobotsRules::parse(
            "User-agent: *\n\
             Disallow: /private/\n\
             Disallow: /admin/\n",
        );
        assert!(!rules.is_allowed("CardsmithBot", "/private/page"));
        assert!(!rules.is_allowed("CardsmithBot", "/admin/"));
        assert!(rules.is_allowed("CardsmithBot", "/articles/osmosis"));
    }

    #[test]
    fn allow_overrides_disallow() {
        let rules = RobotsRules::parse(
            "User-agent: *\n\
             Disallow: /private/\n\
             Allow: /private/public/\n",
        );
        assert!(!rules.is_allowed("Bot", "/private/secret"));
        assert!(rules.is_allowed("Bot", "/private/public/page"));
    }

    #[test]
    fn specific_agent_group_wins_over_wildcard() {
        let rules = RobotsRules::parse(
            "User-agent: *\n\
             Disallow: /\n\
             \n\
             User-agent: cardsmithbot\n\
             Allow: /\n",
        );
        assert!(!rules.is_allowed("OtherBot", "/page"));
        assert!(rules.is_allowed("CardsmithBot", "/page"));
        // Product token with version still matches the group.
        assert!(rules.is_allowed("CardsmithBot/1.0", "/page"));
    }

    #[test]
    fn disallow_all() {
        let rules = RobotsRules::parse("User-agent: *\nDisallow: /\n");
        assert!(!rules.is_allowed("Bot", "/anything"));
        assert!(!rules.is_allowed("Bot", "/"));
    }

    #[test]
    fn comments_and_junk_are_skipped() {
        let rules = RobotsRules::parse(
            "# full-line comment\n\
             User-agent: * # trailing comment\n\
             Disallow: /tmp/ # another\n\
             not a directive line\n",
        );
        assert!(!rules.is_allowed("Bot", "/tmp/x"));
        assert!(rules.is_allowed("Bot", "/ok"));
    }
}
