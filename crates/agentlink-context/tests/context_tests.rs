//! Tests for agentlink-context: TokenCounter and ContextBuffer admission, eviction, fork

use agentlink_context::*;
use agentlink_core::{Message, Role, ToolCall};

/// Independent oracle: recount every visible message.
fn oracle_total(buffer: &ContextBuffer) -> usize {
    let counter = TokenCounter::new(
        buffer.config().chars_per_token,
        buffer.config().message_overhead,
    );
    buffer.iter().map(|m| counter.count(m)).sum()
}

/// Content of exactly `tokens` estimated tokens at 4 chars per token.
fn content_of(tokens: usize, tag: &str) -> String {
    let mut s = tag.to_string();
    while s.len() < tokens * 4 {
        s.push('.');
    }
    s
}

fn roles(buffer: &ContextBuffer) -> Vec<Role> {
    buffer.iter().map(|m| m.role).collect()
}

// ===========================================================================
// TokenCounter
// ===========================================================================

#[test]
fn token_counter_estimate_plus_overhead() {
    let counter = TokenCounter::default();
    // 11 chars -> 3 tokens, + 3 overhead
    assert_eq!(counter.count(&Message::human("hello world")), 6);
}

#[test]
fn token_counter_prefers_authoritative_count() {
    let counter = TokenCounter::default();
    let msg = Message::assistant("x".repeat(400)).with_token_count(7);
    assert_eq!(counter.count(&msg), 7);
}

#[test]
fn token_counter_caps_authoritative_count() {
    let counter = TokenCounter::default();
    let msg = Message::human("hi").with_token_count(usize::MAX);
    assert_eq!(counter.count(&msg), MAX_MESSAGE_TOKENS);
}

#[test]
fn token_counter_includes_correlation_id() {
    let counter = TokenCounter::new(1, 0);
    assert_eq!(counter.count(&Message::tool_result("abcd", "ef")), 6);
}

#[test]
fn token_counter_counts_characters_not_bytes() {
    let counter = TokenCounter::new(1, 0);
    assert_eq!(counter.estimate("héllo"), 5);
}

// ===========================================================================
// Running total
// ===========================================================================

#[test]
fn running_total_matches_oracle_after_every_call() {
    let config = ContextConfig::default().with_max_tokens(120);
    let mut buffer = ContextBuffer::new(config);

    buffer.add(Message::system("you drive a browser"));
    assert_eq!(buffer.token_count(), oracle_total(&buffer));

    for i in 0..12 {
        buffer.add(Message::human(format!("turn {} please open the next tab", i)));
        assert_eq!(buffer.token_count(), oracle_total(&buffer));
        buffer.add(Message::assistant_with_tools(
            "opening",
            vec![ToolCall::new(format!("tc-{}", i), "open_tab", r#"{"url":"a"}"#)],
        ));
        assert_eq!(buffer.token_count(), oracle_total(&buffer));
        buffer.add(Message::tool_result(format!("tc-{}", i), "opened"));
        assert_eq!(buffer.token_count(), oracle_total(&buffer));
        buffer.add(Message::browser_state(format!("tabs: {}", i + 1)));
        assert_eq!(buffer.token_count(), oracle_total(&buffer));
    }

    buffer.remove(Role::ToolResult);
    assert_eq!(buffer.token_count(), oracle_total(&buffer));
    buffer.replace_content(Role::Assistant, "a much longer streamed reply than before");
    assert_eq!(buffer.token_count(), oracle_total(&buffer));
    buffer.remove_last();
    assert_eq!(buffer.token_count(), oracle_total(&buffer));
    buffer.set_budget(20);
    assert_eq!(buffer.token_count(), oracle_total(&buffer));
}

// ===========================================================================
// Singleton roles
// ===========================================================================

#[test]
fn singleton_roles_appear_at_most_once() {
    let mut buffer = ContextBuffer::default();
    for i in 0..5 {
        buffer.add(Message::system(format!("system v{}", i)));
        buffer.add(Message::browser_state(format!("state {}", i)));
        buffer.add(Message::todo_list(format!("- [ ] step {}", i)));
        buffer.add(Message::human(format!("msg {}", i)));
    }
    for role in [Role::System, Role::BrowserState, Role::TodoList] {
        assert_eq!(buffer.messages_with_role(role).len(), 1, "{} duplicated", role);
    }
    assert_eq!(buffer.messages_with_role(Role::Human).len(), 5);
    assert_eq!(buffer.messages_with_role(Role::System)[0].content, "system v4");
}

#[test]
fn singleton_replacement_in_empty_buffer() {
    let mut buffer = ContextBuffer::default();
    buffer.add(Message::todo_list("a"));
    buffer.remove_last();
    buffer.add(Message::todo_list("b"));
    assert_eq!(buffer.len(), 1);
}

#[test]
fn system_reasserted_at_index_zero() {
    let mut buffer = ContextBuffer::default();
    buffer.add(Message::system("old"));
    buffer.add(Message::human("hi"));
    buffer.add(Message::assistant("hello"));
    buffer.insert(Message::system("new"), 0);
    assert_eq!(roles(&buffer), vec![Role::System, Role::Human, Role::Assistant]);
    assert_eq!(buffer.messages()[0].content, "new");
}

#[test]
fn insert_position_is_clamped() {
    let mut buffer = ContextBuffer::default();
    buffer.add(Message::human("a"));
    buffer.insert(Message::assistant("b"), 99);
    assert_eq!(roles(&buffer), vec![Role::Human, Role::Assistant]);
}

// ===========================================================================
// Eviction
// ===========================================================================

#[test]
fn keep_recent_floor_survives_any_budget() {
    for budget in [0, 1, 5, 50] {
        let config = ContextConfig::default().with_max_tokens(budget);
        let mut buffer = ContextBuffer::new(config);
        for i in 0..10 {
            buffer.add(Message::assistant(format!("a{}", i)).with_token_count(1));
        }
        let contents: Vec<String> = buffer.iter().map(|m| m.content.clone()).collect();
        for expected in ["a7", "a8", "a9"] {
            assert!(
                contents.iter().any(|c| c == expected),
                "budget {}: {} missing from {:?}",
                budget,
                expected,
                contents
            );
        }
    }
}

#[test]
fn eviction_removes_lowest_tier_first() {
    // Soft cap 50. Five old entries of 8 tokens each plus three recent of 1.
    let config = ContextConfig::default()
        .with_max_tokens(100)
        .with_trim_threshold(0.5);
    let mut buffer = ContextBuffer::new(config);
    buffer.add(Message::todo_list("todo").with_token_count(8));
    buffer.add(Message::browser_state("state").with_token_count(8));
    buffer.add(Message::human("human").with_token_count(8));
    buffer.add(Message::tool_result("tc", "result").with_token_count(8));
    buffer.add(Message::assistant("assistant").with_token_count(8));
    for i in 0..3 {
        buffer.add(Message::human(format!("recent {}", i)).with_token_count(1));
    }
    assert_eq!(buffer.token_count(), 43);

    // 43 + 10 = 53 > 50: exactly one eviction needed.
    buffer.add(Message::human("incoming").with_token_count(10));
    assert!(!buffer.contains_role(Role::Assistant));
    assert!(buffer.contains_role(Role::ToolResult));
    assert_eq!(buffer.token_count(), 45);

    // Next pressure takes the tool result, then the old human message.
    buffer.add(Message::human("incoming 2").with_token_count(10));
    assert!(!buffer.contains_role(Role::ToolResult));
    buffer.add(Message::human("incoming 3").with_token_count(10));
    assert!(!buffer.iter().any(|m| m.content == "human"));
    assert!(buffer.contains_role(Role::BrowserState));
    assert!(buffer.contains_role(Role::TodoList));
}

#[test]
fn eviction_takes_oldest_within_tier() {
    let config = ContextConfig::default()
        .with_max_tokens(10)
        .with_trim_threshold(1.0)
        .with_keep_recent(1);
    let mut buffer = ContextBuffer::new(config);
    buffer.add(Message::assistant("first").with_token_count(4));
    buffer.add(Message::assistant("second").with_token_count(4));
    buffer.add(Message::human("now").with_token_count(4));
    let contents: Vec<String> = buffer.iter().map(|m| m.content.clone()).collect();
    assert_eq!(contents, vec!["second", "now"]);
}

#[test]
fn oversized_message_is_admitted() {
    let config = ContextConfig::default().with_max_tokens(10);
    let mut buffer = ContextBuffer::new(config);
    buffer.add(Message::tool_result("tc", "x".repeat(1000)));
    assert_eq!(buffer.len(), 1);
    assert!(buffer.token_count() > buffer.max_tokens());
    assert_eq!(buffer.remaining_tokens(), 0);
}

#[test]
fn huge_authoritative_counts_do_not_overflow_total() {
    let mut buffer = ContextBuffer::default();
    buffer.add(Message::tool_result("tc-1", "a").with_token_count(usize::MAX));
    buffer.add(Message::tool_result("tc-2", "b").with_token_count(usize::MAX));

    assert_eq!(buffer.len(), 2);
    assert_eq!(buffer.token_count(), 2 * MAX_MESSAGE_TOKENS);
    assert_eq!(buffer.token_count(), oracle_total(&buffer));
    assert_eq!(buffer.remaining_tokens(), 0);

    buffer.replace_content(Role::ToolResult, "short");
    assert_eq!(buffer.token_count(), oracle_total(&buffer));
}

#[test]
fn scenario_budget_100_threshold_half() {
    let config = ContextConfig::default()
        .with_max_tokens(100)
        .with_trim_threshold(0.5);
    let mut buffer = ContextBuffer::new(config);

    buffer.add(Message::system(content_of(10, "sys")));
    assert_eq!(buffer.token_count(), 13);

    for pair in 1..=3 {
        buffer.add(Message::human(content_of(10, &format!("h{}", pair))));
        buffer.add(Message::assistant(content_of(10, &format!("a{}", pair))));
    }

    assert_eq!(
        roles(&buffer),
        vec![
            Role::System,
            Role::Human,
            Role::Assistant,
            Role::Human,
            Role::Assistant
        ]
    );
    let tags: Vec<String> = buffer
        .iter()
        .map(|m| m.content.trim_end_matches('.').to_string())
        .collect();
    assert_eq!(tags, vec!["sys", "h2", "a2", "h3", "a3"]);
    assert_eq!(buffer.token_count(), 65);
}

#[test]
fn set_budget_shrinks_to_hard_budget() {
    let config = ContextConfig::default().with_max_tokens(1000);
    let mut buffer = ContextBuffer::new(config);
    for i in 0..10 {
        buffer.add(Message::human(format!("h{}", i)).with_token_count(10));
    }
    assert_eq!(buffer.token_count(), 100);

    buffer.set_budget(45);
    assert_eq!(buffer.max_tokens(), 45);
    assert_eq!(buffer.token_count(), 40);
    assert_eq!(buffer.len(), 4);
}

#[test]
fn set_budget_stops_at_keep_recent_floor() {
    let mut buffer = ContextBuffer::default();
    for i in 0..5 {
        buffer.add(Message::assistant(format!("a{}", i)).with_token_count(10));
    }
    buffer.set_budget(1);
    assert_eq!(buffer.len(), 3);
    assert_eq!(buffer.token_count(), 30);
}

#[test]
fn set_budget_larger_evicts_nothing() {
    let mut buffer = ContextBuffer::default();
    buffer.add(Message::human("hi"));
    buffer.add(Message::assistant("hello"));
    buffer.set_budget(100_000);
    assert_eq!(buffer.len(), 2);
}

// ===========================================================================
// Removal and streaming
// ===========================================================================

#[test]
fn remove_by_role_counts() {
    let mut buffer = ContextBuffer::default();
    buffer.add(Message::tool_result("1", "a"));
    buffer.add(Message::human("h"));
    buffer.add(Message::tool_result("2", "b"));
    assert_eq!(buffer.remove(Role::ToolResult), 2);
    assert_eq!(buffer.remove(Role::ToolResult), 0);
    assert_eq!(roles(&buffer), vec![Role::Human]);
}

#[test]
fn remove_last_on_empty() {
    let mut buffer = ContextBuffer::default();
    assert!(!buffer.remove_last());
    buffer.add(Message::human("x"));
    assert!(buffer.remove_last());
    assert!(buffer.is_empty());
    assert_eq!(buffer.token_count(), 0);
}

#[test]
fn streaming_append_adjusts_by_delta() {
    let mut buffer = ContextBuffer::default();
    buffer.add(Message::human("what is on the page?"));
    buffer.add(Message::assistant(""));
    let before = buffer.token_count();

    assert!(buffer.append_content(Role::Assistant, "The page "));
    assert!(buffer.append_content(Role::Assistant, "shows a login form."));
    assert_eq!(buffer.last().unwrap().content, "The page shows a login form.");
    // 28 chars -> 7 tokens
    assert_eq!(buffer.token_count(), before + 7);
    assert_eq!(buffer.token_count(), oracle_total(&buffer));
}

#[test]
fn replace_content_targets_most_recent_role() {
    let mut buffer = ContextBuffer::default();
    buffer.add(Message::assistant("old"));
    buffer.add(Message::human("q"));
    buffer.add(Message::assistant("streaming"));
    assert!(buffer.replace_content(Role::Assistant, "done"));
    let assistants = buffer.messages_with_role(Role::Assistant);
    assert_eq!(assistants[0].content, "old");
    assert_eq!(assistants[1].content, "done");
    assert!(!buffer.replace_content(Role::TodoList, "nothing"));
}

#[test]
fn replace_content_drops_authoritative_count() {
    let mut buffer = ContextBuffer::default();
    buffer.add(Message::assistant("x").with_token_count(500));
    assert_eq!(buffer.token_count(), 500);
    buffer.replace_content(Role::Assistant, "abcd");
    assert_eq!(buffer.token_count(), 4);
}

// ===========================================================================
// Fork
// ===========================================================================

#[test]
fn fork_is_isolated_both_ways() {
    let mut buffer = ContextBuffer::default();
    buffer.add(Message::system("sys"));
    buffer.add(Message::human("hi"));

    let mut fork = buffer.fork(true);
    assert_eq!(fork.messages(), buffer.messages());
    assert_eq!(fork.token_count(), buffer.token_count());

    let parent_messages = buffer.messages();
    let parent_tokens = buffer.token_count();
    fork.add(Message::assistant("only in fork"));
    fork.replace_content(Role::Human, "edited in fork");
    assert_eq!(buffer.messages(), parent_messages);
    assert_eq!(buffer.token_count(), parent_tokens);

    let fork_messages = fork.messages();
    let fork_tokens = fork.token_count();
    buffer.add(Message::todo_list("- [ ] only in parent"));
    buffer.remove(Role::System);
    assert_eq!(fork.messages(), fork_messages);
    assert_eq!(fork.token_count(), fork_tokens);
}

#[test]
fn fork_without_history_keeps_config() {
    let config = ContextConfig::default()
        .with_max_tokens(321)
        .with_keep_recent(5);
    let mut buffer = ContextBuffer::new(config.clone());
    buffer.add(Message::human("hi"));
    let fork = buffer.fork(false);
    assert!(fork.is_empty());
    assert_eq!(fork.token_count(), 0);
    assert_eq!(fork.config(), &config);
}

// ===========================================================================
// Config
// ===========================================================================

#[test]
fn config_defaults() {
    let config = ContextConfig::default();
    assert_eq!(config.max_tokens, 8192);
    assert_eq!(config.keep_recent, 3);
    assert_eq!(config.trim_target(), 4915);
}

#[test]
fn config_partial_json_uses_defaults() {
    let config: ContextConfig = serde_json::from_str(r#"{"max_tokens": 100}"#).unwrap();
    assert_eq!(config.max_tokens, 100);
    assert_eq!(config.trim_threshold, 0.6);
    assert_eq!(config.trim_target(), 60);
}
