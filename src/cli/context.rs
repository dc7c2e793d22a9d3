use crate::association::AssociationEngine;
use crate::cli::memory::preview;
use crate::memory::Memories;
use crate::search::SearchFilters;

/// Run the context command: recall for the prompt, then follow associations
/// from what was recalled
pub fn run_context(prompt: &str, limit: usize, associations: Option<usize>) -> Result<(), String> {
    let mem = match Memories::open() {
        Ok(m) => m,
        Err(_) => {
            // Silent exit if no memory store
            return Ok(());
        }
    };

    let recalled = mem
        .recall(prompt, limit, &SearchFilters::default())
        .map_err(|e| format!("Failed to recall: {}", e))?;

    if recalled.is_empty() {
        return Ok(());
    }

    println!("# Relevant Memories\n");

    for r in &recalled {
        let m = &r.memory;
        println!(
            "## [{}] {} ({}, {})",
            m.id,
            m.timestamp.get(..10).unwrap_or(&m.timestamp),
            m.category,
            m.emotional_trace.primary
        );
        if !m.tags.is_empty() {
            println!("*Tags: {}*\n", m.tags.join(", "));
        }
        println!("{}\n", preview(&m.content, 500));
    }

    let settings = &mem.settings().association;
    let top_k = associations.unwrap_or(settings.top_k);
    let seeds: Vec<String> = recalled.iter().map(|r| r.memory.id.clone()).collect();
    let associated = AssociationEngine::from_settings(settings)
        .spread(&mem, &seeds, settings.depth, top_k)
        .map_err(|e| format!("Failed to spread activation: {}", e))?;

    if associated.is_empty() {
        return Ok(());
    }

    println!("# Associated\n");
    for a in associated {
        let Some(m) = mem
            .get_by_id(&a.memory_id)
            .map_err(|e| format!("Failed to get memory: {}", e))?
        else {
            continue;
        };
        println!(
            "- [{}] ({} {:.0}%, depth {}) {}",
            m.id,
            a.source.as_str(),
            a.score * 100.0,
            a.depth,
            preview(&m.content, 150)
        );
    }

    Ok(())
}
