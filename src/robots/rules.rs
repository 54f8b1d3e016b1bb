//! RFC 9309 robots.txt parsing and longest-match rule evaluation.

/// A single `Disallow`/`Allow` rule within a user-agent group.
#[derive(Debug, Clone)]
struct Rule {
    path_prefix: String,
    allow: bool,
}

/// One `User-agent:` group and its rules, in file order.
#[derive(Debug, Clone)]
struct Group {
    agents: Vec<String>,
    rules: Vec<Rule>,
    crawl_delay: Option<f64>,
}

/// Parsed robots.txt for one origin.
#[derive(Debug, Clone, Default)]
pub struct RobotsRules {
    groups: Vec<Group>,
    pub sitemaps: Vec<String>,
}

/// Result of matching a path against the applicable group's rules.
#[derive(Debug, Clone)]
pub struct RuleMatch {
    pub allow: bool,
    pub rule: Option<String>,
}

impl RobotsRules {
    /// Permissive default used when robots.txt is absent (404/410),
    /// inaccessible (network error, 5xx, other 4xx), or empty.
    #[must_use]
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn parse(body: &str) -> Self {
        let mut groups: Vec<Group> = Vec::new();
        let mut sitemaps = Vec::new();
        // Agents accumulated for the group currently being declared. A run of
        // consecutive `User-agent:` lines belongs to one group (RFC 9309
        // §2.2.1); the first non-`User-agent` directive closes the group.
        let mut pending_agents: Vec<String> = Vec::new();
        let mut current_rules: Vec<Rule> = Vec::new();
        let mut current_delay: Option<f64> = None;
        let mut accepting_agents = true;

        let close_group = |groups: &mut Vec<Group>,
                            agents: &mut Vec<String>,
                            rules: &mut Vec<Rule>,
                            delay: &mut Option<f64>| {
            if !agents.is_empty() {
                groups.push(Group {
                    agents: std::mem::take(agents),
                    rules: std::mem::take(rules),
                    crawl_delay: delay.take(),
                });
            }
        };

        for raw_line in body.lines() {
            let line = strip_comment(raw_line).trim();
            if line.is_empty() {
                continue;
            }
            let Some((field, value)) = line.split_once(':') else {
                continue;
            };
            let field = field.trim().to_ascii_lowercase();
            let value = value.trim();

            match field.as_str() {
                "user-agent" => {
                    if !accepting_agents {
                        close_group(
                            &mut groups,
                            &mut pending_agents,
                            &mut current_rules,
                            &mut current_delay,
                        );
                        accepting_agents = true;
                    }
                    pending_agents.push(value.to_ascii_lowercase());
                }
                "disallow" => {
                    accepting_agents = false;
                    current_rules.push(Rule {
                        path_prefix: value.to_string(),
                        allow: value.is_empty(),
                    });
                }
                "allow" => {
                    accepting_agents = false;
                    current_rules.push(Rule {
                        path_prefix: value.to_string(),
                        allow: true,
                    });
                }
                "crawl-delay" => {
                    accepting_agents = false;
                    current_delay = value.parse::<f64>().ok();
                }
                "sitemap" => {
                    sitemaps.push(value.to_string());
                }
                _ => {}
            }
        }
        close_group(
            &mut groups,
            &mut pending_agents,
            &mut current_rules,
            &mut current_delay,
        );

        Self { groups, sitemaps }
    }

    /// Longest-`Disallow`/`Allow`-prefix-wins evaluation for `user_agent` on `path`.
    ///
    /// A group matches if any of its declared agent tokens is a (case-insensitive,
    /// non-wildcard) substring-prefix of `user_agent`, or if the group is `*`.
    /// The most specific matching group is used; within it, the longest
    /// matching rule prefix wins, ties broken in favor of `Allow`.
    #[must_use]
    pub fn evaluate(&self, user_agent: &str, path: &str) -> RuleMatch {
        let ua = user_agent.to_ascii_lowercase();
        let group = self
            .groups
            .iter()
            .filter(|g| g.agents.iter().any(|a| a == "*" || ua.contains(a.as_str())))
            .max_by_key(|g| {
                g.agents
                    .iter()
                    .filter(|a| *a != "*")
                    .map(String::len)
                    .max()
                    .unwrap_or(0)
            });

        let Some(group) = group else {
            return RuleMatch {
                allow: true,
                rule: None,
            };
        };

        let best = group
            .rules
            .iter()
            .filter(|r| path.starts_with(r.path_prefix.as_str()) || r.path_prefix.is_empty())
            .max_by_key(|r| r.path_prefix.len());

        match best {
            Some(rule) => RuleMatch {
                allow: rule.allow,
                rule: Some(rule.path_prefix.clone()),
            },
            None => RuleMatch {
                allow: true,
                rule: None,
            },
        }
    }

    #[must_use]
    pub fn crawl_delay(&self, user_agent: &str) -> Option<f64> {
        let ua = user_agent.to_ascii_lowercase();
        self.groups
            .iter()
            .find(|g| g.agents.iter().any(|a| a == "*" || ua.contains(a.as_str())))
            .and_then(|g| g.crawl_delay)
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_allows_everything() {
        let rules = RobotsRules::parse("");
        let m = rules.evaluate("AtlasCrawler", "/private");
        assert!(m.allow);
    }

    #[test]
    fn disallow_blocks_matching_prefix() {
        let body = "User-agent: *\nDisallow: /private\n";
        let rules = RobotsRules::parse(body);
        assert!(!rules.evaluate("AtlasCrawler", "/private/x").allow);
        assert!(rules.evaluate("AtlasCrawler", "/public").allow);
    }

    #[test]
    fn longest_match_wins_over_shorter_disallow() {
        let body = "User-agent: *\nDisallow: /a\nAllow: /a/b\n";
        let rules = RobotsRules::parse(body);
        assert!(rules.evaluate("AtlasCrawler", "/a/b/c").allow);
        assert!(!rules.evaluate("AtlasCrawler", "/a/x").allow);
    }

    #[test]
    fn specific_agent_group_overrides_wildcard() {
        let body = "User-agent: *\nDisallow: /\n\nUser-agent: AtlasCrawler\nAllow: /\n";
        let rules = RobotsRules::parse(body);
        assert!(rules.evaluate("AtlasCrawler", "/anything").allow);
        assert!(!rules.evaluate("OtherBot", "/anything").allow);
    }

    #[test]
    fn sitemap_lines_are_recorded() {
        let body = "Sitemap: https://example.com/sitemap.xml\n";
        let rules = RobotsRules::parse(body);
        assert_eq!(rules.sitemaps, vec!["https://example.com/sitemap.xml"]);
    }

    #[test]
    fn crawl_delay_is_parsed_not_enforced() {
        let body = "User-agent: *\nCrawl-delay: 2.5\n";
        let rules = RobotsRules::parse(body);
        assert_eq!(rules.crawl_delay("AtlasCrawler"), Some(2.5));
    }
}
