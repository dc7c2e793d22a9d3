use crate::config::STORE_DIR;
use crate::memory::Memories;
use crate::search::SearchFilters;
use crate::types::{Category, Emotion, Memory, MemorySearchResult, NewMemory};
use std::io::{self, Write};
use std::path::Path;

/// Arguments of the remember command
pub struct RememberArgs {
    pub content: String,
    pub emotion: String,
    pub secondary: String,
    pub intensity: f64,
    pub valence: f64,
    pub arousal: f64,
    pub importance: i64,
    pub category: String,
    pub tags: String,
    pub private: bool,
}

fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_range(raw: &str) -> Result<(f64, f64), String> {
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    match parts.as_slice() {
        [lo, hi] => {
            let lo = lo.parse().map_err(|_| format!("Invalid range bound: {}", lo))?;
            let hi = hi.parse().map_err(|_| format!("Invalid range bound: {}", hi))?;
            Ok((lo, hi))
        }
        _ => Err(format!("Expected MIN,MAX but got: {}", raw)),
    }
}

/// Build search filters from command-line values
pub fn parse_filters(
    emotion: Option<&str>,
    category: Option<&str>,
    date_from: Option<String>,
    date_to: Option<String>,
    valence: Option<&str>,
    arousal: Option<&str>,
) -> Result<SearchFilters, String> {
    Ok(SearchFilters {
        emotion: emotion.map(str::parse::<Emotion>).transpose()?,
        category: category.map(str::parse::<Category>).transpose()?,
        date_from,
        date_to,
        valence_range: valence.map(parse_range).transpose()?,
        arousal_range: arousal.map(parse_range).transpose()?,
    })
}

/// Run the init command
pub fn run_init(path: &str) -> Result<(), String> {
    let path = Path::new(path);
    let store_path = path.join(STORE_DIR);

    if store_path.exists() {
        return Err(format!("{} already exists at {}", STORE_DIR, store_path.display()));
    }

    let mem = Memories::init(path)?;
    if let Some(p) = mem.store_path() {
        println!("Initialized {} at {}", STORE_DIR, p.display());
    }

    Ok(())
}

/// Run the remember command
pub fn run_remember(args: RememberArgs) -> Result<(), String> {
    let mem = Memories::open()?;

    let secondary = split_csv(&args.secondary)
        .iter()
        .map(|s| s.parse::<Emotion>())
        .collect::<Result<Vec<_>, _>>()?;

    let new = NewMemory {
        emotion: args.emotion.parse()?,
        secondary,
        intensity: args.intensity.clamp(0.0, 1.0),
        importance: args.importance,
        category: args.category.parse()?,
        valence: args.valence.clamp(-1.0, 1.0),
        arousal: args.arousal.clamp(0.0, 1.0),
        tags: split_csv(&args.tags),
        private: args.private,
        ..NewMemory::new(&args.content)
    };

    let outcome = mem
        .save_with_auto_link(new)
        .map_err(|e| format!("Failed to save memory: {}", e))?;

    if let Some(dup) = outcome.duplicate_of {
        println!(
            "Already remembered as [{}] (distance {:.3}), not saved.",
            dup.memory.id, dup.distance
        );
        return Ok(());
    }

    if let Some(memory) = outcome.memory {
        println!("Remembered [{}]", memory.id);
        if !memory.tags.is_empty() {
            println!("  tags: {}", memory.tags.join(", "));
        }
    }
    if outcome.links_created > 0 {
        println!("  linked to {} similar:", outcome.links_created);
        for r in &outcome.linked {
            println!("    [{}] distance {:.3}", r.memory.id, r.distance);
        }
    }

    Ok(())
}

/// Run the search command
pub fn run_search(query: &str, limit: usize, filters: &SearchFilters) -> Result<(), String> {
    let mem = Memories::open()?;
    let results = mem
        .search(query, limit, filters)
        .map_err(|e| format!("Failed to search: {}", e))?;

    if results.is_empty() {
        println!("No matching memories.");
        return Ok(());
    }

    for r in &results {
        print_result(r);
    }

    Ok(())
}

/// Run the recall command
pub fn run_recall(context: &str, limit: usize, filters: &SearchFilters) -> Result<(), String> {
    let mem = Memories::open()?;
    let results = mem
        .recall(context, limit, filters)
        .map_err(|e| format!("Failed to recall: {}", e))?;

    if results.is_empty() {
        println!("Nothing comes to mind.");
        return Ok(());
    }

    for r in &results {
        print_result(r);
    }

    Ok(())
}

/// Run the show command
pub fn run_show(id: &str) -> Result<(), String> {
    let mem = Memories::open()?;
    let memory = mem
        .get_by_id(id)
        .map_err(|e| format!("Failed to get memory: {}", e))?
        .ok_or_else(|| format!("Memory not found: {}", id))?;

    let trace = &memory.emotional_trace;
    println!("[{}] {}", memory.id, memory.timestamp);
    println!("  category:   {}", memory.category);
    println!("  importance: {}", memory.importance);
    print!("  emotion:    {} ({:.2})", trace.primary, trace.intensity);
    if !trace.secondary.is_empty() {
        let secondary: Vec<&str> = trace.secondary.iter().map(Emotion::as_str).collect();
        print!(" + {}", secondary.join(", "));
    }
    println!();
    println!("  valence {:+.2}, arousal {:.2}", trace.valence, trace.arousal);
    if let Some(body) = &trace.body_state {
        println!(
            "  body: {}, load {}, up {:.1}h",
            body.time_phase, body.system_load, body.uptime_hours
        );
    }
    if !memory.tags.is_empty() {
        println!("  tags: {}", memory.tags.join(", "));
    }
    if memory.is_private {
        println!("  (private)");
    }

    println!("\n{}\n", memory.content);

    if !memory.linked_ids.is_empty() {
        println!("Links:");
        for link in &memory.linked_ids {
            println!(
                "  -> [{}] {} ({:.2}){}",
                link.target_id,
                link.link_type,
                link.confidence,
                if link.note.is_empty() {
                    String::new()
                } else {
                    format!(" {}", link.note)
                }
            );
        }
    }

    Ok(())
}

/// Run the list command
pub fn run_list(category: Option<&str>, limit: usize) -> Result<(), String> {
    let mem = Memories::open()?;
    let category = category.map(str::parse::<Category>).transpose()?;

    let memories = mem
        .list_recent(limit, category)
        .map_err(|e| format!("Failed to list memories: {}", e))?;

    if memories.is_empty() {
        if category.is_some() {
            println!("No memories in that category.");
        } else {
            println!("No memories yet. Add one with: reverie remember \"...\"");
        }
        return Ok(());
    }

    for m in &memories {
        print_memory(m);
    }

    Ok(())
}

/// Run the forget command
pub fn run_forget(id: &str, force: bool) -> Result<(), String> {
    let mem = Memories::open()?;

    let memory = mem
        .get_by_id(id)
        .map_err(|e| format!("Failed to get memory: {}", e))?
        .ok_or_else(|| format!("Memory not found: {}", id))?;

    if !force {
        println!("Forget [{}]:", id);
        println!("  {}", preview(&memory.content, 100));

        print!("Confirm? [y/N] ");
        io::stdout().flush().map_err(|e| e.to_string())?;

        let mut input = String::new();
        io::stdin().read_line(&mut input).map_err(|e| e.to_string())?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Cancelled.");
            return Ok(());
        }
    }

    mem.delete(id).map_err(|e| format!("Failed to delete memory: {}", e))?;
    println!("Forgotten [{}]", id);

    Ok(())
}

/// Run the stats command
pub fn run_stats() -> Result<(), String> {
    let mem = Memories::open()?;
    let stats = mem.stats().map_err(|e| format!("Failed to compute stats: {}", e))?;

    println!("Memory Statistics");
    println!("=================\n");

    println!("Total memories: {}", stats.total_memories);
    println!("Total links:    {}", stats.total_links);
    println!("Avg importance: {:.2}", stats.avg_importance);

    if !stats.by_category.is_empty() {
        println!("\nCategories:");
        let mut categories: Vec<_> = stats.by_category.iter().collect();
        categories.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
        for (category, count) in categories {
            println!("  {:20} {}", category, count);
        }
    }

    if !stats.emotions.is_empty() {
        println!("\nEmotions (weighted):");
        let mut emotions: Vec<_> = stats.emotions.iter().collect();
        emotions.sort_by(|a, b| b.1.partial_cmp(a.1).unwrap_or(std::cmp::Ordering::Equal));
        for (emotion, weight) in emotions {
            println!("  {:20} {:.1}", emotion, weight);
        }
    }

    Ok(())
}

/// First `max` characters on one line
pub(crate) fn preview(content: &str, max: usize) -> String {
    let mut text: String = content.chars().take(max).collect();
    if content.chars().count() > max {
        text.push_str("...");
    }
    text.replace('\n', " ")
}

fn print_memory(m: &Memory) {
    println!(
        "[{}] {} {} / {} (importance {})",
        m.id,
        m.timestamp.get(..10).unwrap_or(&m.timestamp),
        m.category,
        m.emotional_trace.primary,
        m.importance
    );

    if !m.tags.is_empty() {
        println!("    tags: {}", m.tags.join(", "));
    }
    println!("    {}\n", preview(&m.content, 200));
}

fn print_result(r: &MemorySearchResult) {
    println!(
        "[{}] score: {:.3}, distance: {:.3}, {} / {}",
        r.memory.id, r.score, r.distance, r.memory.category, r.memory.emotional_trace.primary
    );

    if !r.memory.tags.is_empty() {
        println!("    tags: {}", r.memory.tags.join(", "));
    }
    println!("    {}\n", preview(&r.memory.content, 200));
}
