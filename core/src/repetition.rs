use crate::command::base_command;

/// Length of the trailing run of actions whose base command equals the last
/// action's base command.
///
/// The run includes the last action itself: a brand-new, never-repeated
/// action counts 1, and only an empty history counts 0. Downstream
/// thresholds rely on this convention. The count is recomputed from the live
/// action list on every call, never cached.
pub fn trailing_repeat_count(actions: &[String]) -> usize {
    let Some(last) = actions.last() else {
        return 0;
    };
    let last_base = base_command(last);

    let mut count = 0;
    for action in actions.iter().rev() {
        if base_command(action) == last_base {
            count += 1;
        } else {
            break;
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actions(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|a| (*a).to_string()).collect()
    }

    #[test]
    fn test_empty_history_counts_zero() {
        assert_eq!(trailing_repeat_count(&[]), 0);
    }

    #[test]
    fn test_solitary_action_counts_one() {
        assert_eq!(trailing_repeat_count(&actions(&["ls"])), 1);
    }

    #[test]
    fn test_trailing_run_counted() {
        assert_eq!(trailing_repeat_count(&actions(&["cd x", "ls", "ls", "ls"])), 3);
    }

    #[test]
    fn test_differing_action_breaks_the_streak() {
        // The earlier `ls` streak does not carry over past the `cd x`.
        assert_eq!(
            trailing_repeat_count(&actions(&["ls", "ls", "ls", "cd x", "ls"])),
            1
        );
    }

    #[test]
    fn test_surface_differences_still_count_as_repeats() {
        // Different flags, same base command.
        assert_eq!(
            trailing_repeat_count(&actions(&["ls -a", "ls -b", "ls -c"])),
            3
        );
        // Env prefix and chained `cd` do not change the identity either.
        assert_eq!(
            trailing_repeat_count(&actions(&["python3 run.py", "FOO=1 python run.py"])),
            2
        );
    }

    #[test]
    fn test_whole_history_may_be_one_run() {
        assert_eq!(
            trailing_repeat_count(&actions(&["grep -r a", "grep b", "grep c /src"])),
            3
        );
    }
}
