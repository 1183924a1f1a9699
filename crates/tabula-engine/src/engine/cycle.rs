//! Circular dependency detection for formula cells.
//!
//! Strongly connected components are found with an iterative version of
//! Tarjan's algorithm, so deep dependency chains cannot overflow the stack.
//! A component with more than one member, or a single member depending on
//! itself, is a cycle.

/// Strongly connected components of a graph given as adjacency lists
/// (`adjacency[n]` lists the nodes `n` depends on).
///
/// Components come out in dependency order: a component is emitted only
/// after every component it depends on.
pub fn tarjan_scc(adjacency: &[Vec<usize>]) -> Vec<Vec<usize>> {
    const UNVISITED: usize = usize::MAX;

    let n = adjacency.len();
    let mut index = vec![UNVISITED; n];
    let mut lowlink = vec![0; n];
    let mut on_stack = vec![false; n];
    let mut stack: Vec<usize> = Vec::new();
    let mut components = Vec::new();
    let mut next_index = 0;

    // (node, position in its adjacency list)
    let mut call_stack: Vec<(usize, usize)> = Vec::new();

    for root in 0..n {
        if index[root] != UNVISITED {
            continue;
        }
        call_stack.push((root, 0));
        index[root] = next_index;
        lowlink[root] = next_index;
        next_index += 1;
        stack.push(root);
        on_stack[root] = true;

        while let Some(frame) = call_stack.last_mut() {
            let node = frame.0;
            if let Some(&next) = adjacency[node].get(frame.1) {
                frame.1 += 1;
                if index[next] == UNVISITED {
                    index[next] = next_index;
                    lowlink[next] = next_index;
                    next_index += 1;
                    stack.push(next);
                    on_stack[next] = true;
                    call_stack.push((next, 0));
                } else if on_stack[next] {
                    lowlink[node] = lowlink[node].min(index[next]);
                }
                continue;
            }

            call_stack.pop();
            if let Some(&(parent, _)) = call_stack.last() {
                lowlink[parent] = lowlink[parent].min(lowlink[node]);
            }
            if lowlink[node] == index[node] {
                let mut component = Vec::new();
                while let Some(member) = stack.pop() {
                    on_stack[member] = false;
                    component.push(member);
                    if member == node {
                        break;
                    }
                }
                components.push(component);
            }
        }
    }

    components
}

/// Whether a component is a cycle.
pub fn is_cycle(component: &[usize], adjacency: &[Vec<usize>]) -> bool {
    match component {
        [single] => adjacency[*single].contains(single),
        _ => true,
    }
}
