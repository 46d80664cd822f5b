use std::collections::HashMap;

use super::BindInfo;
use crate::diagnostics::{codes, Diagnostics};

/// Gap between renumbered priorities.
pub const PRIORITY_STEP: u32 = 100;

/// Order one bind point's binds as `before`, `inplace`, `after` and renumber
/// the whole sequence when a priority is missing or the order is not
/// strictly increasing.
///
/// Numeric gotos follow their target within the same position; a goto past
/// the highest old priority of its position becomes `END` and any other
/// unmapped number becomes `1`. Goto expressions are kept and reported.
pub fn reprioritize(binds: Vec<BindInfo>, diagnostics: &mut Diagnostics) -> Vec<BindInfo> {
    let mut groups: [Vec<BindInfo>; 3] = Default::default();
    for bind in binds {
        groups[bind.position.index()].push(bind);
    }
    let mut ordered: Vec<BindInfo> = groups.into_iter().flatten().collect();

    let needed = ordered.iter().any(|b| b.priority == 0)
        || ordered.windows(2).any(|w| w[0].priority >= w[1].priority);
    if !needed {
        return ordered;
    }

    // old → new, per position: equal old priorities may exist in two groups
    let mut renumbered: [HashMap<u32, u32>; 3] = Default::default();
    let mut next = PRIORITY_STEP;
    for bind in &mut ordered {
        renumbered[bind.position.index()].insert(bind.priority, next);
        bind.priority = next;
        bind.tree.set_arg(&bind.slots.priority, next.to_string());
        next += PRIORITY_STEP;
    }

    for bind in &mut ordered {
        let Some(goto) = bind.goto.clone() else {
            continue;
        };
        if !goto.is_empty() && goto.bytes().all(|b| b.is_ascii_digit()) {
            let map = &renumbered[bind.position.index()];
            let highest_old = map.keys().copied().max().unwrap_or(0);
            let target = goto
                .parse::<u64>()
                .ok()
                .and_then(|old| u32::try_from(old).ok());
            let new_goto = match target.and_then(|old| map.get(&old)) {
                Some(new) => new.to_string(),
                None if target.map_or(true, |old| old > highest_old) => "END".to_string(),
                None => "1".to_string(),
            };
            bind.tree.set_arg(&bind.slots.goto, new_goto.clone());
            bind.goto = Some(new_goto);
        } else if !["NEXT", "END", "USE_INVOCATION_RESULT"]
            .iter()
            .any(|kw| goto.eq_ignore_ascii_case(kw))
        {
            diagnostics.warning(
                codes::GOTO_EXPRESSION,
                bind.tree.lineno,
                format!(
                    "gotoPriorityExpression in {} uses an expression. Since the priorities for this bindpoint have been renumbered, this expression will need to be modified manually.",
                    bind.tree
                ),
            );
        }
    }

    ordered
}
