//! Tests for rollout buffer functionality

#[cfg(test)]
mod gae_tests {
    use crate::buffer::rollout::{
        compute_gae, gae::compute_gae_single_env, RolloutBuffer, TrainingBatch, Transition,
    };

    fn transition(reward: f32, value: f32, done: bool) -> Transition {
        Transition {
            observation: vec![0.0],
            action: vec![1.0],
            reward,
            done,
            value,
            log_prob: -0.5,
            next_value: None,
            outcome: None,
        }
    }

    fn buffer_from(steps: &[(f32, f32, bool)], bootstrap: f32) -> RolloutBuffer {
        let mut buffer = RolloutBuffer::new(steps.len());
        for &(reward, value, done) in steps {
            buffer.push(transition(reward, value, done)).unwrap();
        }
        buffer.resolve_next_values(bootstrap);
        buffer
    }

    #[test]
    fn test_gae_matches_closed_form_for_single_episode() {
        // done only at the final index
        let rewards = [0.5_f32, -0.2, 1.0, 0.3, 2.0];
        let values = [0.1_f32, 0.4, -0.3, 0.8, 0.2];
        let (gamma, lambda) = (0.9_f32, 0.8_f32);

        let steps: Vec<(f32, f32, bool)> = rewards
            .iter()
            .zip(&values)
            .enumerate()
            .map(|(t, (&r, &v))| (r, v, t == rewards.len() - 1))
            .collect();
        let buffer = buffer_from(&steps, 123.0);
        let result = compute_gae(&buffer, gamma, lambda).unwrap();

        let n = rewards.len();
        let deltas: Vec<f32> = (0..n)
            .map(|t| {
                let next = if t + 1 < n { values[t + 1] } else { 0.0 };
                rewards[t] + gamma * next - values[t]
            })
            .collect();

        for t in 0..n {
            let expected: f32 = (t..n)
                .map(|l| (gamma * lambda).powi((l - t) as i32) * deltas[l])
                .sum();
            assert!(
                (result.advantages[t] - expected).abs() < 1e-5,
                "step {}: expected {}, got {}",
                t,
                expected,
                result.advantages[t]
            );
            assert!((result.returns[t] - (expected + values[t])).abs() < 1e-5);
        }
    }

    #[test]
    fn test_gae_resets_between_mini_episodes() {
        // Episode A: steps 0..3, episode B: steps 3..7
        let a = [(1.0, 0.5, false), (1.0, 0.5, false), (1.0, 0.5, true)];
        let b = [(2.0, 1.0, false), (2.0, 1.0, false), (2.0, 1.0, false), (2.0, 1.0, true)];
        let joined: Vec<_> = a.iter().chain(b.iter()).copied().collect();

        let together = compute_gae(&buffer_from(&joined, 0.0), 0.99, 0.95).unwrap();
        let alone_a = compute_gae(&buffer_from(&a, 0.0), 0.99, 0.95).unwrap();
        let alone_b = compute_gae(&buffer_from(&b, 0.0), 0.99, 0.95).unwrap();

        for t in 0..3 {
            assert!((together.advantages[t] - alone_a.advantages[t]).abs() < 1e-6);
        }
        for t in 0..4 {
            assert!((together.advantages[3 + t] - alone_b.advantages[t]).abs() < 1e-6);
        }

        // Terminal step of episode A: delta = 1.0 + 0 - 0.5
        assert!((together.advantages[2] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_gae_simple_episode() {
        let rewards = vec![1.0, 1.0, 1.0];
        let values = vec![2.0, 2.0, 2.0];
        let next_values = vec![2.0, 2.0, 0.0];
        let dones = vec![false, false, true];

        let mut advantages = vec![0.0; 3];
        let mut returns = vec![0.0; 3];

        compute_gae_single_env(
            &rewards,
            &values,
            &next_values,
            &dones,
            1.0,
            1.0,
            &mut advantages,
            &mut returns,
        );

        // Step 2 (terminal): delta = 1.0 + 0 - 2.0 = -1.0
        // Step 1: delta = 1.0, gae = 1.0 - 1.0 = 0.0
        // Step 0: delta = 1.0, gae = 1.0 + 0.0 = 1.0
        assert!((advantages[2] - (-1.0)).abs() < 1e-6, "Step 2: got {}", advantages[2]);
        assert!(advantages[1].abs() < 1e-6, "Step 1: got {}", advantages[1]);
        assert!((advantages[0] - 1.0).abs() < 1e-6, "Step 0: got {}", advantages[0]);
        assert_eq!(returns, vec![3.0, 2.0, 1.0]);
    }

    #[test]
    fn test_truncated_buffer_bootstraps() {
        // Not done at the end: last next value is the bootstrap
        let buffer = buffer_from(&[(0.0, 1.0, false), (0.0, 1.0, false)], 4.0);
        let next: Vec<f32> = buffer.transitions().iter().map(|t| t.next_value.unwrap()).collect();
        assert_eq!(next, vec![1.0, 4.0]);

        let result = compute_gae(&buffer, 1.0, 1.0).unwrap();
        // delta_1 = 0 + 4 - 1 = 3, delta_0 = 0 + 1 - 1 = 0
        assert_eq!(result.advantages, vec![3.0, 3.0]);
    }

    #[test]
    fn test_empty_and_unresolved_buffers_fail() {
        assert!(compute_gae(&RolloutBuffer::new(4), 0.99, 0.95).is_err());

        let mut buffer = RolloutBuffer::new(1);
        buffer.push(transition(1.0, 0.0, false)).unwrap();
        assert!(compute_gae(&buffer, 0.99, 0.95).is_err());
    }

    #[test]
    fn test_buffer_rejects_overflow() {
        let mut buffer = RolloutBuffer::new(1);
        buffer.push(transition(0.0, 0.0, false)).unwrap();
        assert!(buffer.is_full());
        assert!(buffer.push(transition(0.0, 0.0, false)).is_err());
    }

    #[test]
    fn test_bootstrap_invariant() {
        let buffer = buffer_from(
            &[(0.0, 0.3, false), (1.0, 0.6, true), (0.0, 0.9, false), (0.0, 0.2, false)],
            0.7,
        );
        for t in buffer.transitions() {
            assert_eq!(t.next_value == Some(0.0), t.done);
        }
        assert_eq!(buffer.last().unwrap().next_value, Some(0.7));
        assert!(buffer.is_resolved());
    }

    #[test]
    fn test_training_batch_concatenates_per_buffer_gae() {
        let first = buffer_from(&[(1.0, 0.0, false), (1.0, 0.0, false)], 10.0);
        let second = buffer_from(&[(0.0, 0.0, true)], 0.0);
        let empty = RolloutBuffer::new(3);

        let batch = TrainingBatch::from_rollouts([&first, &empty, &second], 1.0, 1.0).unwrap();
        assert_eq!(batch.len(), 3);
        // second buffer's advantage is independent of the first's bootstrap
        assert_eq!(batch.advantages[2], 0.0);
        assert_eq!(batch.advantages[1], 11.0);
        assert_eq!(batch.advantages[0], 12.0);
        assert_eq!(batch.old_log_probs, vec![-0.5; 3]);

        let none = TrainingBatch::from_rollouts(std::iter::empty(), 0.99, 0.95).unwrap();
        assert!(none.is_empty());
    }
}
