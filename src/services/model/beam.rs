use std::cmp::Ordering;
use std::collections::HashSet;

use super::ModelError;

/// Incremental next-token scorer. `State` is whatever the scorer carries per hypothesis
/// (a KV cache for a transformer); it is cloned when a beam forks.
pub(crate) trait TokenScorer {
    type State: Clone;

    /// Scores the prompt and returns the state positioned after it.
    fn prefill(&mut self, prompt: &[u32]) -> Result<(Self::State, Vec<f32>), ModelError>;

    /// Feeds the last token of `tokens` into `state` and scores the next position.
    fn step(&mut self, state: &mut Self::State, tokens: &[u32]) -> Result<Vec<f32>, ModelError>;
}

/// Deterministic beam-search decoder.
///
/// `max_length` bounds the whole sequence (prompt included). Hypotheses are ranked by
/// cumulative log-probability divided by sequence length.
#[derive(Debug, Clone)]
pub(crate) struct BeamSearch {
    pub(crate) num_beams: usize,
    pub(crate) no_repeat_ngram_size: usize,
    pub(crate) eos_token: Option<u32>,
    pub(crate) max_length: usize,
}

struct Beam<S> {
    tokens: Vec<u32>,
    score: f32,
    state: S,
    log_probs: Vec<f32>,
}

#[derive(Debug, Clone)]
struct Hypothesis {
    tokens: Vec<u32>,
    score: f32,
}

impl Hypothesis {
    fn normalized(&self) -> f32 {
        self.score / self.tokens.len().max(1) as f32
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    beam: usize,
    token: u32,
    score: f32,
}

impl BeamSearch {
    pub(crate) fn new(eos_token: Option<u32>, max_length: usize) -> Self {
        Self { num_beams: 5, no_repeat_ngram_size: 2, eos_token, max_length }
    }

    /// Returns only the generated suffix, without the prompt or a trailing EOS token.
    pub(crate) fn generate<S: TokenScorer>(
        &self,
        scorer: &mut S,
        prompt: &[u32],
    ) -> Result<Vec<u32>, ModelError> {
        if prompt.len() >= self.max_length || self.num_beams == 0 {
            return Ok(Vec::new());
        }

        let (state, log_probs) = scorer.prefill(prompt)?;
        let mut running = vec![Beam { tokens: prompt.to_vec(), score: 0.0, state, log_probs }];
        let mut finished: Vec<Hypothesis> = Vec::new();

        while !running.is_empty()
            && running[0].tokens.len() < self.max_length
            && finished.len() < self.num_beams
        {
            let mut candidates = Vec::new();
            for (index, beam) in running.iter().enumerate() {
                let banned = self.banned_tokens(&beam.tokens);
                for (token, log_prob) in beam.log_probs.iter().enumerate() {
                    let token = token as u32;
                    if !log_prob.is_finite() || banned.contains(&token) {
                        continue;
                    }
                    candidates.push(Candidate {
                        beam: index,
                        token,
                        score: beam.score + log_prob,
                    });
                }
            }

            candidates.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(Ordering::Equal)
                    .then(a.beam.cmp(&b.beam))
                    .then(a.token.cmp(&b.token))
            });
            candidates.truncate(self.num_beams * 2);

            let mut next = Vec::with_capacity(self.num_beams);
            for candidate in candidates {
                let parent = &running[candidate.beam];
                let mut tokens = parent.tokens.clone();
                tokens.push(candidate.token);

                if Some(candidate.token) == self.eos_token {
                    if finished.len() < self.num_beams {
                        finished.push(Hypothesis { tokens, score: candidate.score });
                    }
                } else if next.len() < self.num_beams {
                    let mut state = parent.state.clone();
                    // Sequences at the cap are never extended, so skip scoring them.
                    let log_probs = if tokens.len() < self.max_length {
                        scorer.step(&mut state, &tokens)?
                    } else {
                        Vec::new()
                    };
                    next.push(Beam { tokens, score: candidate.score, state, log_probs });
                }
            }
            if next.is_empty() {
                break;
            }
            running = next;
        }

        finished.extend(
            running.into_iter().map(|beam| Hypothesis { tokens: beam.tokens, score: beam.score }),
        );
        let best = finished
            .into_iter()
            .max_by(|a, b| a.normalized().partial_cmp(&b.normalized()).unwrap_or(Ordering::Equal));

        let Some(best) = best else {
            return Ok(Vec::new());
        };

        let mut generated = best.tokens[prompt.len()..].to_vec();
        if generated.last().copied() == self.eos_token && self.eos_token.is_some() {
            generated.pop();
        }
        Ok(generated)
    }

    fn banned_tokens(&self, tokens: &[u32]) -> HashSet<u32> {
        let n = self.no_repeat_ngram_size;
        if n == 0 || tokens.len() + 1 < n {
            return HashSet::new();
        }

        let prefix = &tokens[tokens.len() + 1 - n..];
        tokens
            .windows(n)
            .filter(|window| &window[..n - 1] == prefix)
            .map(|window| window[n - 1])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fixed preference table: each entry maps the last token to next-token log-probs.
    struct TableScorer {
        vocab: usize,
        table: Vec<(u32, Vec<(u32, f32)>)>,
        calls: usize,
    }

    impl TableScorer {
        fn row(&mut self, tokens: &[u32]) -> Vec<f32> {
            self.calls += 1;
            let mut out = vec![-20.0; self.vocab];
            let last = tokens.last().copied().unwrap_or_default();
            if let Some((_, row)) = self.table.iter().find(|(token, _)| *token == last) {
                for (token, log_prob) in row {
                    out[*token as usize] = *log_prob;
                }
            }
            out
        }
    }

    /// State records every token fed so far, so forks can be checked for isolation.
    impl TokenScorer for TableScorer {
        type State = Vec<u32>;

        fn prefill(&mut self, prompt: &[u32]) -> Result<(Vec<u32>, Vec<f32>), ModelError> {
            Ok((prompt.to_vec(), self.row(prompt)))
        }

        fn step(&mut self, state: &mut Vec<u32>, tokens: &[u32]) -> Result<Vec<f32>, ModelError> {
            state.extend(tokens.last());
            assert_eq!(state.as_slice(), tokens, "state diverged from its hypothesis");
            Ok(self.row(tokens))
        }
    }

    fn scorer() -> TableScorer {
        TableScorer {
            vocab: 6,
            table: vec![
                (0, vec![(1, -0.1), (2, -2.0)]),
                (1, vec![(2, -0.1), (1, -0.05)]),
                (2, vec![(3, -0.2), (5, -0.3)]),
                (3, vec![(5, -0.01)]),
            ],
            calls: 0,
        }
    }

    #[test]
    fn prompt_longer_than_budget_generates_nothing() {
        let mut scorer = scorer();
        let search = BeamSearch::new(Some(5), 3);
        let out = search.generate(&mut scorer, &[0, 1, 2]).expect("generate");
        assert!(out.is_empty());
        assert_eq!(scorer.calls, 0);
    }

    #[test]
    fn stops_at_eos_and_strips_it() {
        let mut scorer = TableScorer {
            vocab: 3,
            table: vec![(0, vec![(1, -0.01)]), (1, vec![(2, -0.01)])],
            calls: 0,
        };
        let search = BeamSearch::new(Some(2), 32);
        let out = search.generate(&mut scorer, &[0]).expect("generate");
        assert_eq!(out, vec![1]);
    }

    #[test]
    fn output_never_exceeds_total_length() {
        let mut scorer = scorer();
        let search = BeamSearch::new(None, 4);
        let out = search.generate(&mut scorer, &[0]).expect("generate");
        assert!(out.len() <= 3);
    }

    #[test]
    fn no_bigram_repeats_in_generated_sequence() {
        let mut scorer = TableScorer {
            vocab: 3,
            table: vec![(0, vec![(1, -0.01)]), (1, vec![(0, -0.01)])],
            calls: 0,
        };
        let search = BeamSearch::new(None, 12);
        let prompt = [0u32];
        let out = search.generate(&mut scorer, &prompt).expect("generate");

        let mut full = prompt.to_vec();
        full.extend(&out);
        let mut seen = HashSet::new();
        for pair in full.windows(2) {
            assert!(seen.insert((pair[0], pair[1])), "bigram {pair:?} repeated in {full:?}");
        }
    }

    #[test]
    fn decoding_is_deterministic() {
        let search = BeamSearch::new(Some(5), 16);
        let first = search.generate(&mut scorer(), &[0]).expect("first");
        let second = search.generate(&mut scorer(), &[0]).expect("second");
        assert_eq!(first, second);
    }

    #[test]
    fn each_step_scores_only_surviving_beams() {
        let mut scorer = scorer();
        let search = BeamSearch::new(Some(5), 6);
        search.generate(&mut scorer, &[0]).expect("generate");
        // One prefill plus at most one step per kept beam per position below the cap.
        assert!(scorer.calls <= 1 + search.num_beams * 4, "calls = {}", scorer.calls);
    }

    #[test]
    fn banned_tokens_complete_existing_bigrams() {
        let search = BeamSearch::new(None, 10);
        let banned = search.banned_tokens(&[4, 7, 4]);
        assert_eq!(banned, HashSet::from([7]));
        assert!(search.banned_tokens(&[]).is_empty());
    }
}
