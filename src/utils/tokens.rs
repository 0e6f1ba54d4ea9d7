// Client-side token arithmetic for the narrative lab. Close enough to the
// server's accounting to be a useful pre-flight number, nothing more.

const CHARS_PER_TOKEN: f64 = 4.0;
const PRICE_PER_THOUSAND_TOKENS_CNY: f64 = 0.08;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsageEstimate {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Estimates prompt tokens for `text` plus an expected completion budget.
/// Blank input costs nothing; anything else costs at least one token.
pub fn estimate(text: &str, expected_completion_tokens: u32) -> TokenUsageEstimate {
    let chars = text.trim().chars().count();
    let prompt_tokens = if chars == 0 {
        0
    } else {
        ((chars as f64) / CHARS_PER_TOKEN).ceil().max(1.0) as u32
    };
    TokenUsageEstimate {
        prompt_tokens,
        completion_tokens: expected_completion_tokens,
        total_tokens: prompt_tokens.saturating_add(expected_completion_tokens),
    }
}

/// Joins the theme and every non-blank branch with newlines, the same shape
/// the generation prompt takes, then estimates that.
pub fn estimate_for_branches(
    theme: &str,
    branches: &[String],
    expected_completion_tokens: u32,
) -> TokenUsageEstimate {
    let mut input = theme.trim().to_string();
    for branch in branches {
        let branch = branch.trim();
        if branch.is_empty() {
            continue;
        }
        input.push('\n');
        input.push_str(branch);
    }
    estimate(&input, expected_completion_tokens)
}

/// Rough renminbi cost for a token count, rounded half away from zero to fen.
pub fn cost_in_cny(tokens: u32) -> f64 {
    if tokens == 0 {
        return 0.0;
    }
    let units = tokens as f64 / 1000.0;
    (units * PRICE_PER_THOUSAND_TOKENS_CNY * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_input_costs_nothing() {
        assert_eq!(estimate("", 0).prompt_tokens, 0);
        assert_eq!(estimate("   \n  ", 0).prompt_tokens, 0);
        assert_eq!(estimate("", 512).total_tokens, 512);
    }

    #[test]
    fn test_non_blank_input_costs_at_least_one_token() {
        assert_eq!(estimate("a", 0).prompt_tokens, 1);
        assert_eq!(estimate("abcd", 0).prompt_tokens, 1);
        assert_eq!(estimate("abcde", 0).prompt_tokens, 2, "ceil, not floor");
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        // four CJK characters are twelve UTF-8 bytes but one token
        assert_eq!(estimate("雾都孤儿", 0).prompt_tokens, 1);
        assert_eq!(estimate("雾都孤儿记", 0).prompt_tokens, 2);
    }

    #[test]
    fn test_estimate_grows_with_input() {
        let short = estimate("雨夜的便利店", 256);
        let long = estimate("雨夜的便利店，玻璃门上倒映着两个世界的灯光", 256);
        assert!(long.prompt_tokens > short.prompt_tokens);
        assert_eq!(long.completion_tokens, 256);
        assert_eq!(
            long.total_tokens,
            long.prompt_tokens + long.completion_tokens
        );
    }

    #[test]
    fn test_maximal_completion_budget_saturates() {
        let usage = estimate("点子", u32::MAX);
        assert_eq!(usage.prompt_tokens, 1);
        assert_eq!(usage.completion_tokens, u32::MAX);
        assert_eq!(usage.total_tokens, u32::MAX, "total must not wrap");
    }

    #[test]
    fn test_branch_concatenation_skips_blanks() {
        let branches = vec![
            "主线A 夺回酒馆".to_string(),
            "   ".to_string(),
            "支线B 旧友重逢".to_string(),
        ];
        let with_blank = estimate_for_branches("双城记", &branches, 512);
        let without_blank = estimate_for_branches(
            "双城记",
            &["主线A 夺回酒馆".to_string(), "支线B 旧友重逢".to_string()],
            512,
        );
        assert_eq!(with_blank, without_blank);

        // theme alone still estimates
        let theme_only = estimate_for_branches("双城记", &[], 512);
        assert_eq!(theme_only.prompt_tokens, 1);
    }

    #[test]
    fn test_cost_rounds_to_fen() {
        assert_eq!(cost_in_cny(0), 0.0);
        assert_eq!(cost_in_cny(1000), 0.08);
        assert_eq!(cost_in_cny(500), 0.04);
        assert_eq!(cost_in_cny(12_500), 1.0);
        // a single token is below half a fen
        assert_eq!(cost_in_cny(1), 0.0);
        // 63 tokens is 0.504 fen, which rounds up
        assert_eq!(cost_in_cny(63), 0.01);
    }
}
