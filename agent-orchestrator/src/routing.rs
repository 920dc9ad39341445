use crate::classify::Complexity;

/// One entry of the complexity → `(provider, model, max_tokens, temperature)`
/// routing matrix, with a declared fallback tried after the primary exhausts
/// its retry budget.
#[derive(Debug, Clone)]
pub struct ModelRoute {
    pub provider: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub fallback: Option<Box<ModelRoute>>,
}

impl ModelRoute {
    fn leaf(provider: &str, model: &str, max_tokens: u32, temperature: f32) -> Self {
        Self {
            provider: provider.to_string(),
            model: model.to_string(),
            max_tokens,
            temperature,
            fallback: None,
        }
    }
}

/// Routes by complexity tier. Simple turns get a cheap, low-latency model
/// with a tight token budget; complex turns get the strongest model with
/// room for multi-step tool reasoning, falling back one rung down the
/// quality ladder on primary failure rather than failing the turn outright.
pub fn route_for_complexity(complexity: Complexity) -> ModelRoute {
    match complexity {
        Complexity::Simple => ModelRoute {
            fallback: Some(Box::new(ModelRoute::leaf("openai", "gpt-4o-mini", 512, 0.3))),
            ..ModelRoute::leaf("openai", "gpt-4o-mini", 512, 0.2)
        },
        Complexity::Medium => ModelRoute {
            fallback: Some(Box::new(ModelRoute::leaf("openai", "gpt-4o-mini", 1024, 0.4))),
            ..ModelRoute::leaf("openai", "gpt-4o", 1024, 0.3)
        },
        Complexity::Complex => ModelRoute {
            fallback: Some(Box::new(ModelRoute::leaf("openai", "gpt-4o", 4096, 0.3))),
            ..ModelRoute::leaf("openai", "gpt-4o", 4096, 0.2)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complex_route_has_larger_token_budget_than_simple() {
        let simple = route_for_complexity(Complexity::Simple);
        let complex = route_for_complexity(Complexity::Complex);
        assert!(complex.max_tokens > simple.max_tokens);
    }

    #[test]
    fn every_tier_declares_a_fallback() {
        for complexity in [Complexity::Simple, Complexity::Medium, Complexity::Complex] {
            assert!(route_for_complexity(complexity).fallback.is_some());
        }
    }
}
