//! Tree shaker: marks live files and live parts by transitive
//! reachability from entry points, then computes each file's `EntryBits`.

use rustc_hash::FxHashSet as HashSet;

use super::model::{EntryBits, Graph, PartIndex, SourceIndex};

/// Runs both tree-shaking sub-passes. Must run after [`super::scan::run`]
/// has frozen `exports_kind`/`wrap` and bound imports.
pub fn run(graph: &mut Graph, entry_points: &[SourceIndex]) {
    mark_liveness(graph, entry_points);
    mark_reachability(graph, entry_points);
}

/// Sub-pass 1 — liveness. DFS from every entry point over the
/// cross-part/cross-file dependency graph, marking files and parts live.
fn mark_liveness(graph: &mut Graph, entry_points: &[SourceIndex]) {
    let mut visited: HashSet<(SourceIndex, PartIndex)> = HashSet::default();
    let mut stack: Vec<(SourceIndex, PartIndex)> = Vec::new();

    for &entry in entry_points {
        let part_count = graph.file(entry).parts.len() as PartIndex;
        for p in 0..part_count {
            stack.push((entry, p));
        }
    }

    // Also seed every part that can't be removed if unused (statement-level
    // side effects), across every reachable file, not just entries.
    for (source, file) in graph.files.iter().enumerate() {
        if file.repr != super::model::FileRepr::Js && file.repr != super::model::FileRepr::Css {
            continue;
        }
        for (idx, part) in file.parts.iter().enumerate() {
            if !part.can_be_removed_if_unused && !file_is_side_effect_free(file) {
                stack.push((source as SourceIndex, idx as PartIndex));
            }
        }
    }

    while let Some((source, part_idx)) = stack.pop() {
        if !visited.insert((source, part_idx)) {
            continue;
        }
        let deps = graph.file(source).parts[part_idx as usize]
            .dependencies
            .clone();
        for (dep_source, dep_part) in deps {
            stack.push((dep_source, dep_part));
        }
    }

    for (source, part_idx) in &visited {
        graph.file_mut(*source).parts[*part_idx as usize].is_live = true;
    }

    for file in &mut graph.files {
        file.is_live = file.parts.iter().any(|p| p.is_live) || file.is_entry_point;
    }
}

fn file_is_side_effect_free(file: &super::model::File) -> bool {
    file.side_effects_free
}

/// Sub-pass 2 — per-entry reachability. For each entry point, DFS setting
/// its bit in every reached file's `EntryBits`, tracking the minimum DFS
/// distance as a stable in-chunk sort key.
fn mark_reachability(graph: &mut Graph, entry_points: &[SourceIndex]) {
    let entry_count = entry_points.len();
    for file in &mut graph.files {
        file.entry_bits = EntryBits::with_capacity(entry_count.max(1));
    }

    for (bit, &entry) in entry_points.iter().enumerate() {
        let mut visited: HashSet<SourceIndex> = HashSet::default();
        let mut stack: Vec<(SourceIndex, u32)> = vec![(entry, 0)];

        while let Some((source, distance)) = stack.pop() {
            if !graph.file(source).is_live {
                continue;
            }
            let already = !visited.insert(source);
            let file = graph.file_mut(source);
            file.entry_bits.set(bit);
            if distance < file.distance_from_entry_point {
                file.distance_from_entry_point = distance;
            }
            if already {
                continue;
            }

            let mut deps: Vec<SourceIndex> = Vec::new();
            for part in &graph.file(source).parts {
                if !part.is_live {
                    continue;
                }
                for &(dep_source, _) in &part.dependencies {
                    if dep_source != source {
                        deps.push(dep_source);
                    }
                }
            }
            // Stable order: push in reverse so popped order matches
            // ascending stable source index, keeping the walk deterministic.
            deps.sort_unstable();
            deps.dedup();
            for dep in deps.into_iter().rev() {
                stack.push((dep, distance + 1));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linker::model::{File, FileRepr, Part};

    #[test]
    fn unreferenced_file_is_not_live() {
        let mut graph = Graph::new();
        let entry = graph.add_file(File::new("/e.js", FileRepr::Js));
        let dead = graph.add_file(File::new("/dead.js", FileRepr::Js));
        graph.file_mut(entry).is_entry_point = true;
        graph.file_mut(dead).parts[0].can_be_removed_if_unused = true;

        run(&mut graph, &[entry]);

        assert!(graph.file(entry).is_live);
        assert!(!graph.file(dead).is_live);
    }

    #[test]
    fn side_effect_part_is_kept_even_if_unreferenced() {
        let mut graph = Graph::new();
        let entry = graph.add_file(File::new("/e.js", FileRepr::Js));
        let other = graph.add_file(File::new("/polyfill.js", FileRepr::Js));
        graph.file_mut(entry).is_entry_point = true;
        graph.file_mut(other).parts[0].can_be_removed_if_unused = false;

        run(&mut graph, &[entry]);

        assert!(
            graph.file(other).is_live,
            "parts without CanBeRemovedIfUnused are always live"
        );
    }

    #[test]
    fn entry_bits_distinguish_entry_points() {
        let mut graph = Graph::new();
        let shared = graph.add_file(File::new("/shared.js", FileRepr::Js));
        let e1 = graph.add_file(File::new("/e1.js", FileRepr::Js));
        let e2 = graph.add_file(File::new("/e2.js", FileRepr::Js));
        graph.file_mut(e1).is_entry_point = true;
        graph.file_mut(e2).is_entry_point = true;
        graph.file_mut(e1).parts.push(Part {
            dependencies: vec![(shared, 0)],
            can_be_removed_if_unused: false,
            ..Default::default()
        });
        graph.file_mut(e2).parts.push(Part {
            dependencies: vec![(shared, 0)],
            can_be_removed_if_unused: false,
            ..Default::default()
        });

        run(&mut graph, &[e1, e2]);

        assert!(graph.file(shared).is_live);
        assert!(graph.file(shared).entry_bits.get(0));
        assert!(graph.file(shared).entry_bits.get(1));
        assert_eq!(graph.file(e1).entry_bits.key(), {
            let mut only_e1 = EntryBits::with_capacity(2);
            only_e1.set(0);
            only_e1.key()
        });
    }
}
