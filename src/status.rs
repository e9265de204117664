//! Channel verification report.
//!
//! With path mapping, every configured rule is checked against the
//! channel index. With name derivation there is nothing to check up front,
//! so the indexed channels are listed instead. Used by `relay status`.

use anyhow::Result;

use crate::channel::sanitize_channel_name;
use crate::config::Config;
use crate::platform::ChannelPlatform;
use crate::resolver::{ChannelCache, ChannelIndex, ResolveStrategy};
use crate::relay::build_resolver;

/// One configured mapping rule and whether its channel exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleStatus {
    pub key: String,
    pub channel: String,
    pub channel_id: Option<String>,
}

impl RuleStatus {
    pub fn exists(&self) -> bool {
        self.channel_id.is_some()
    }
}

pub fn check_rules(strategy: &ResolveStrategy, index: &ChannelIndex) -> Vec<RuleStatus> {
    let ResolveStrategy::Mapping(mapping) = strategy else {
        return Vec::new();
    };
    mapping
        .rules()
        .map(|(key, channel)| {
            let channel = sanitize_channel_name(channel);
            RuleStatus {
                key: key.to_string(),
                channel_id: index.lookup(&channel).map(|c| c.id.clone()),
                channel,
            }
        })
        .collect()
}

/// Print the verification table. Fails only when the platform cannot be
/// reached; missing channels are reported, not errors.
pub async fn run_status(config: &Config, platform: &dyn ChannelPlatform) -> Result<()> {
    let resolver = build_resolver(config);
    let cache = ChannelCache::new(config.channels.scope());
    let index = cache.refresh(platform).await?;

    println!("Scope:        {}", cache.scope());
    println!("Strategy:     {:?}", config.channels.strategy);
    println!("Auto-create:  {}", config.channels.auto_create);
    println!("Channels:     {}", index.len());
    println!();

    match resolver.strategy() {
        ResolveStrategy::Mapping(_) => {
            let rules = check_rules(resolver.strategy(), &index);
            println!("{:<24} {:<28} STATUS", "PATH", "CHANNEL");
            for rule in &rules {
                let status = match &rule.channel_id {
                    Some(id) => format!("OK ({})", id),
                    None if config.channels.auto_create => "MISSING (will be created)".to_string(),
                    None => "MISSING".to_string(),
                };
                println!("{:<24} #{:<27} {}", rule.key, rule.channel, status);
            }
            let missing = rules.iter().filter(|r| !r.exists()).count();
            println!();
            println!("{} of {} mapped channels found", rules.len() - missing, rules.len());
        }
        ResolveStrategy::Derive => {
            println!("{:<28} ID", "CHANNEL");
            for channel in index.channels() {
                println!("#{:<27} {}", channel.name, channel.id);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelMapping;
    use crate::platform::ChannelHandle;

    #[test]
    fn test_check_rules_reports_missing_channels() {
        let strategy = ResolveStrategy::Mapping(ChannelMapping::new([
            ("specs", "specifications"),
            ("root", "documentation"),
        ]));
        let index = ChannelIndex::from_channels([ChannelHandle {
            id: "7".to_string(),
            name: "Specifications".to_string(),
        }]);

        let rules = check_rules(&strategy, &index);
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].channel_id.as_deref(), Some("7"));
        assert!(!rules[1].exists());
    }

    #[test]
    fn test_check_rules_matches_spaced_mapping_value() {
        let strategy = ResolveStrategy::Mapping(ChannelMapping::new([("root", "Project Docs")]));
        let index = ChannelIndex::from_channels([ChannelHandle {
            id: "9".to_string(),
            name: "project-docs".to_string(),
        }]);

        let rules = check_rules(&strategy, &index);
        assert_eq!(rules[0].channel, "project-docs");
        assert_eq!(rules[0].channel_id.as_deref(), Some("9"));
    }

    #[test]
    fn test_check_rules_empty_for_derive() {
        assert!(check_rules(&ResolveStrategy::Derive, &ChannelIndex::default()).is_empty());
    }
}
