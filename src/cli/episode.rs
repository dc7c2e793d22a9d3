use crate::cli::memory::preview;
use crate::episodes::EpisodeStore;
use crate::memory::Memories;
use crate::types::Episode;

fn print_episode(episode: &Episode) {
    println!(
        "[{}] {} .. {} ({} memories, importance {})",
        episode.id,
        episode.start_time.get(..10).unwrap_or(&episode.start_time),
        episode.end_time.get(..10).unwrap_or(&episode.end_time),
        episode.memory_ids.len(),
        episode.importance
    );
    println!("    {}\n", preview(&episode.summary, 200));
}

/// Run the episode create command
pub fn run_create(memory_ids: &[String], summary: &str) -> Result<(), String> {
    let mem = Memories::open()?;
    let episodes = EpisodeStore::open(&mem)?;

    let episode = episodes
        .create(memory_ids, summary)
        .map_err(|e| format!("Failed to create episode: {}", e))?;
    println!("Created episode [{}] with {} memories", episode.id, episode.memory_ids.len());

    Ok(())
}

/// Run the episode show command
pub fn run_show(id: &str) -> Result<(), String> {
    let mem = Memories::open()?;
    let episodes = EpisodeStore::open(&mem)?;

    let episode = episodes
        .get_by_id(id)
        .map_err(|e| format!("Failed to get episode: {}", e))?
        .ok_or_else(|| format!("Episode not found: {}", id))?;

    println!("[{}] {}", episode.id, episode.summary);
    println!("  from:       {}", episode.start_time);
    println!("  to:         {}", episode.end_time);
    println!("  importance: {}", episode.importance);
    println!("\nMemories:");
    for memory_id in &episode.memory_ids {
        let content = mem
            .get_by_id(memory_id)
            .map_err(|e| format!("Failed to get memory: {}", e))?
            .map(|m| preview(&m.content, 100))
            .unwrap_or_else(|| "(forgotten)".to_string());
        println!("  [{}] {}", memory_id, content);
    }

    Ok(())
}

/// Run the episode list command
pub fn run_list(limit: usize) -> Result<(), String> {
    let mem = Memories::open()?;
    let store = EpisodeStore::open(&mem)?;
    let episodes = store
        .list(limit)
        .map_err(|e| format!("Failed to list episodes: {}", e))?;

    if episodes.is_empty() {
        println!("No episodes yet. Group memories with: reverie episode create -s \"...\" <ids>");
        return Ok(());
    }

    let total = store.count().map_err(|e| format!("Failed to count episodes: {}", e))?;
    println!("{} of {} episodes\n", episodes.len(), total);
    for episode in &episodes {
        print_episode(episode);
    }

    Ok(())
}

/// Run the episode search command
pub fn run_search(query: &str, limit: usize) -> Result<(), String> {
    let mem = Memories::open()?;
    let episodes = EpisodeStore::open(&mem)?
        .search(query, limit)
        .map_err(|e| format!("Failed to search episodes: {}", e))?;

    if episodes.is_empty() {
        println!("No matching episodes.");
        return Ok(());
    }

    for episode in &episodes {
        print_episode(episode);
    }

    Ok(())
}
