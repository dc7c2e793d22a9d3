use crate::association::AssociationEngine;
use crate::cli::memory::preview;
use crate::consolidation::ConsolidationEngine;
use crate::memory::Memories;
use crate::types::LinkType;

/// Run the link command
pub fn run_link(source: &str, target: &str, link_type: &str) -> Result<(), String> {
    let link_type: LinkType = link_type.parse()?;
    let mem = Memories::open()?;

    for id in [source, target] {
        mem.get_by_id(id)
            .map_err(|e| format!("Failed to get memory: {}", e))?
            .ok_or_else(|| format!("Memory not found: {}", id))?;
    }

    let created = mem
        .link(source, target, link_type)
        .map_err(|e| format!("Failed to link: {}", e))?;

    if created {
        println!("Linked [{}] <-> [{}] ({})", source, target, link_type);
    } else {
        println!("Already linked [{}] -> [{}]", source, target);
    }

    Ok(())
}

/// Run the bump command
pub fn run_bump(a: &str, b: &str, delta: f64) -> Result<(), String> {
    let mem = Memories::open()?;

    let changed = mem
        .bump_confidence(a, b, delta)
        .map_err(|e| format!("Failed to bump link: {}", e))?;

    if !changed {
        println!("No change.");
        return Ok(());
    }

    let confidence = mem
        .get_by_id(a)
        .map_err(|e| format!("Failed to get memory: {}", e))?
        .and_then(|m| m.link_to(b).map(|l| l.confidence));
    match confidence {
        Some(c) => println!("[{}] <-> [{}] confidence {:.2}", a, b, c),
        None => println!("Updated [{}] <-> [{}]", a, b),
    }

    Ok(())
}

/// Run the associate command
pub fn run_associate(seeds: &[String], depth: Option<usize>, limit: Option<usize>) -> Result<(), String> {
    let mem = Memories::open()?;
    let settings = &mem.settings().association;

    let results = AssociationEngine::from_settings(settings)
        .spread(
            &mem,
            seeds,
            depth.unwrap_or(settings.depth),
            limit.unwrap_or(settings.top_k),
        )
        .map_err(|e| format!("Failed to spread activation: {}", e))?;

    if results.is_empty() {
        println!("No associations.");
        return Ok(());
    }

    for r in results {
        let content = mem
            .get_by_id(&r.memory_id)
            .map_err(|e| format!("Failed to get memory: {}", e))?
            .map(|m| preview(&m.content, 120))
            .unwrap_or_default();
        println!(
            "[{}] score: {:.3}, depth {}, {}",
            r.memory_id,
            r.score,
            r.depth,
            r.source.as_str()
        );
        println!("    {}\n", content);
    }

    Ok(())
}

/// Run the consolidate command
pub fn run_consolidate(window: Option<i64>, json: bool) -> Result<(), String> {
    let mem = Memories::open()?;

    let mut settings = mem.settings().consolidation.clone();
    if let Some(hours) = window {
        settings.window_hours = hours;
    }

    let stats = ConsolidationEngine::new(settings)
        .run(&mem)
        .map_err(|e| format!("Consolidation failed: {}", e))?;

    if json {
        let out = serde_json::to_string_pretty(&stats).map_err(|e| format!("Failed to serialize: {}", e))?;
        println!("{}", out);
        return Ok(());
    }

    println!("Consolidation");
    println!("=============\n");
    println!("Replay events:        {}", stats.replay_events);
    println!("Coactivation updates: {}", stats.coactivation_updates);
    println!("New links:            {}", stats.link_updates);
    println!("Refreshed memories:   {}", stats.refreshed_memories);

    if !stats.merge_candidates.is_empty() {
        println!("\nPossible duplicates:");
        for c in &stats.merge_candidates {
            println!("  [{}] <-> [{}] distance {:.3}", c.id_a, c.id_b, c.distance);
            println!("    {}", preview(&c.snippet_a, 100));
            println!("    {}", preview(&c.snippet_b, 100));
        }
    }

    Ok(())
}
