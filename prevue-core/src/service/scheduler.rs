//! Deterministic schedule block generator
//!
//! Fills channels with programs for rolling 24-hour windows. Generation is
//! seeded per (channel, block start): the same seed over the same library
//! snapshot and tracker state replays an identical program sequence, so
//! regenerating a block never shifts what viewers see.
//!
//! The RNG is xoshiro256** seeded from SHA-256(channel_number ++
//! block_start RFC3339). The algorithm family is part of the contract;
//! swapping it would silently reshuffle every schedule.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;
use sha2::{Digest, Sha256};

use crate::config::ScheduleConfig;
use crate::models::{
    Channel, ItemKind, LibraryItem, RatingBucket, ScheduleBlock, ScheduleProgram,
};
use crate::repository::{BlockRepository, ChannelRepository};
use crate::service::broadcaster::{Broadcaster, Envelope};
use crate::service::clock;
use crate::service::library_index::LibraryIndex;
use crate::service::settings::SettingsService;
use crate::Result;

/// Gap at the block tail below which the main loop hands over to the
/// gap filler.
const TAIL_GUARD_MS: i64 = 5 * 60_000;
/// Interstitial size used to advance past unschedulable stretches.
const INTERSTITIAL_STEP_MS: i64 = 5 * 60_000;
/// Remaining time under which a single interstitial covers the tail.
const SHORT_TAIL_MS: i64 = 30 * 60_000;
/// Consecutive scheduling failures before constraints are relaxed.
const RELAXED_PASS_AT: u32 = 25;
/// Hard stop for the main loop.
const MAX_FAILED_ATTEMPTS: u32 = 50;
/// Uniform pick pool size for movie selection.
const MOVIE_POOL_SIZE: usize = 20;
/// Episode runs air 2-5 episodes of one series back to back.
const EPISODE_RUN_MIN: u32 = 2;
const EPISODE_RUN_MAX: u32 = 5;
/// Chance of attempting an episode run when both modes are available.
const EPISODE_MODE_PROBABILITY: f64 = 0.6;
/// Bound on tail gap-fill iterations.
const GAP_FILL_ITERATIONS: usize = 100;
/// Cooldown windows: items aired this recently on the channel are avoided.
pub const COOLDOWN_HOURS: i64 = 24;
pub const MOVIE_ONLY_COOLDOWN_HOURS: i64 = 8;

/// Cross-channel bookings for one generation pass: item id → occupied
/// `[start_ms, end_ms)` intervals. Prevents the same item airing at
/// overlapping times on different channels.
#[derive(Debug, Default)]
pub struct GlobalTracker {
    intervals: HashMap<String, Vec<(i64, i64)>>,
}

impl GlobalTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the tracker with every program of the given blocks.
    #[must_use]
    pub fn from_blocks(blocks: &[ScheduleBlock]) -> Self {
        let mut tracker = Self::new();
        for block in blocks {
            for program in &block.programs {
                if let Some(item_id) = program.item_id() {
                    tracker.book(
                        item_id,
                        program.start_time().timestamp_millis(),
                        program.end_time().timestamp_millis(),
                    );
                }
            }
        }
        tracker
    }

    #[must_use]
    pub fn conflicts(&self, item_id: &str, start_ms: i64, end_ms: i64) -> bool {
        self.intervals
            .get(item_id)
            .is_some_and(|spans| spans.iter().any(|&(s, e)| start_ms < e && end_ms > s))
    }

    pub fn book(&mut self, item_id: &str, start_ms: i64, end_ms: i64) {
        self.intervals
            .entry(item_id.to_string())
            .or_default()
            .push((start_ms, end_ms));
    }
}

/// Seed string and RNG for one (channel, block start) pair.
#[must_use]
pub fn block_seed(channel_number: i64, block_start: DateTime<Utc>) -> (String, Xoshiro256StarStar) {
    let digest = Sha256::digest(format!("{channel_number}{}", block_start.to_rfc3339()));
    let mut seed = [0u8; 32];
    seed.copy_from_slice(&digest);
    (hex::encode(digest), Xoshiro256StarStar::from_seed(seed))
}

/// The cooldown window applicable to an item set.
#[must_use]
pub fn cooldown_hours(items: &[LibraryItem]) -> i64 {
    let has_movies = items.iter().any(|i| i.kind == ItemKind::Movie);
    let has_episodes = items.iter().any(|i| i.kind == ItemKind::Episode);
    if has_movies && !has_episodes {
        MOVIE_ONLY_COOLDOWN_HOURS
    } else {
        COOLDOWN_HOURS
    }
}

/// Generate one schedule block.
///
/// `items` is the resolved, rating-filtered pool; `cooldown` holds item ids
/// aired within the cooldown window before `block_start`; `tracker` carries
/// other channels' bookings and receives this block's.
pub async fn generate_block(
    channel_number: i64,
    block_start: DateTime<Utc>,
    block_hours: i64,
    items: &[LibraryItem],
    cooldown: &HashSet<String>,
    tracker: &mut GlobalTracker,
) -> ScheduleBlock {
    let block_end = clock::block_end(block_start, block_hours);
    let (seed, mut rng) = block_seed(channel_number, block_start);

    let mut gen = BlockGen::new(items, cooldown, block_start, block_end);
    if !gen.is_empty() {
        gen.run(&mut rng, tracker).await;
    }

    ScheduleBlock {
        channel_number,
        block_start,
        block_end,
        seed,
        programs: gen.programs,
        created_at: Utc::now(),
    }
}

/// Working state for one block generation.
struct BlockGen<'a> {
    /// Series key → episodes in (season, episode) order. Episodes with no
    /// series id form a singleton series keyed by their own id.
    series: BTreeMap<String, Vec<&'a LibraryItem>>,
    /// Movies, sorted by id.
    standalone: Vec<&'a LibraryItem>,
    cooldown: &'a HashSet<String>,
    is_movie_only: bool,

    cursor_ms: i64,
    end_ms: i64,
    programs: Vec<ScheduleProgram>,
    last_item_id: Option<String>,
    last_series: Option<String>,
    last_bucket: Option<RatingBucket>,
    used_in_block: HashSet<String>,
    series_used: BTreeMap<String, u32>,
    series_idx: BTreeMap<String, usize>,
}

impl<'a> BlockGen<'a> {
    fn new(
        items: &'a [LibraryItem],
        cooldown: &'a HashSet<String>,
        block_start: DateTime<Utc>,
        block_end: DateTime<Utc>,
    ) -> Self {
        let mut series: BTreeMap<String, Vec<&LibraryItem>> = BTreeMap::new();
        let mut standalone: Vec<&LibraryItem> = Vec::new();
        for item in items {
            if item.duration_ms() <= 0 {
                continue;
            }
            match item.kind {
                ItemKind::Episode => {
                    let key = item.series_id.clone().unwrap_or_else(|| item.id.clone());
                    series.entry(key).or_default().push(item);
                }
                ItemKind::Movie => standalone.push(item),
            }
        }
        for episodes in series.values_mut() {
            episodes.sort_by(|a, b| {
                (a.season, a.episode, &a.id).cmp(&(b.season, b.episode, &b.id))
            });
        }
        standalone.sort_by(|a, b| a.id.cmp(&b.id));
        let is_movie_only = !standalone.is_empty() && series.is_empty();

        Self {
            series,
            standalone,
            cooldown,
            is_movie_only,
            cursor_ms: block_start.timestamp_millis(),
            end_ms: block_end.timestamp_millis(),
            programs: Vec::new(),
            last_item_id: None,
            last_series: None,
            last_bucket: None,
            used_in_block: HashSet::new(),
            series_used: BTreeMap::new(),
            series_idx: BTreeMap::new(),
        }
    }

    fn is_empty(&self) -> bool {
        self.series.is_empty() && self.standalone.is_empty()
    }

    async fn run(&mut self, rng: &mut Xoshiro256StarStar, tracker: &mut GlobalTracker) {
        // Every series starts at a deterministic random offset so channels
        // don't all open on the pilot.
        let keys: Vec<String> = self.series.keys().cloned().collect();
        for key in keys {
            let len = self.series[&key].len();
            self.series_idx.insert(key, rng.gen_range(0..len));
        }

        let mut failed_attempts: u32 = 0;
        let mut iterations: usize = 0;
        while self.cursor_ms < self.end_ms - TAIL_GUARD_MS && failed_attempts < MAX_FAILED_ATTEMPTS
        {
            iterations += 1;
            if iterations % 10 == 0 {
                tokio::task::yield_now().await;
            }

            let scheduled = if failed_attempts >= RELAXED_PASS_AT {
                if self.relaxed_pick(tracker) {
                    true
                } else if self.end_ms - self.cursor_ms < SHORT_TAIL_MS {
                    let start = self.cursor_ms;
                    self.emit_interstitial(start, self.end_ms);
                    break;
                } else {
                    let start = self.cursor_ms;
                    self.emit_interstitial(start, start + INTERSTITIAL_STEP_MS);
                    continue;
                }
            } else {
                let use_episodes = !self.series.is_empty()
                    && (self.standalone.is_empty()
                        || (rng.gen::<f64>() < EPISODE_MODE_PROBABILITY && !self.is_movie_only));
                if use_episodes {
                    self.try_episode_run(rng, tracker)
                } else {
                    self.try_movie(rng, tracker)
                }
            };

            if !scheduled {
                failed_attempts += 1;
            }
        }

        self.fill_tail(tracker);
        self.label_interstitials();
    }

    /// Attempt a run of 2-5 episodes from one series.
    fn try_episode_run(
        &mut self,
        rng: &mut Xoshiro256StarStar,
        tracker: &mut GlobalTracker,
    ) -> bool {
        let run_len = rng.gen_range(EPISODE_RUN_MIN..=EPISODE_RUN_MAX);

        let all: Vec<String> = self.series.keys().cloned().collect();
        // Stay within the current rating bucket when possible.
        let mut candidates: Vec<String> = match self.last_bucket {
            Some(bucket) => {
                let same: Vec<String> = all
                    .iter()
                    .filter(|k| self.series_bucket(k) == bucket)
                    .cloned()
                    .collect();
                if same.is_empty() { all.clone() } else { same }
            }
            None => all,
        };

        // Least-used tier: series used at most min+1 times this block.
        let min_used = candidates
            .iter()
            .map(|k| self.series_used.get(k).copied().unwrap_or(0))
            .min()
            .unwrap_or(0);
        candidates.retain(|k| self.series_used.get(k).copied().unwrap_or(0) <= min_used + 1);

        // Prefer series that are fresh: not what just aired and not cooling down.
        let preferred: Vec<String> = candidates
            .iter()
            .filter(|k| {
                Some(k.as_str()) != self.last_series.as_deref() && !self.series_in_cooldown(k)
            })
            .cloned()
            .collect();
        let pool = if preferred.is_empty() { &candidates } else { &preferred };
        if pool.is_empty() {
            return false;
        }
        let chosen = pool[rng.gen_range(0..pool.len())].clone();

        let mut scheduled_any = false;
        for _ in 0..run_len {
            let Some((pos, episode)) = self.next_episode(&chosen, tracker) else {
                break;
            };
            self.commit(episode, tracker);
            self.series_idx.insert(chosen.clone(), pos + 1);
            scheduled_any = true;
        }
        if scheduled_any {
            *self.series_used.entry(chosen.clone()).or_insert(0) += 1;
            self.last_series = Some(chosen);
        }
        scheduled_any
    }

    /// Scan a series from its current index (wrapping) for the next
    /// airable episode. Episodes not yet used this block win over reruns.
    fn next_episode(&self, series_key: &str, tracker: &GlobalTracker) -> Option<(usize, &'a LibraryItem)> {
        let episodes = self.series.get(series_key)?;
        let start_idx = self.series_idx.get(series_key).copied().unwrap_or(0);
        let len = episodes.len();

        for require_unused in [true, false] {
            for offset in 0..len {
                let pos = (start_idx + offset) % len;
                let episode = episodes[pos];
                let end = self.cursor_ms + episode.duration_ms();
                if end > self.end_ms {
                    continue;
                }
                if self.cooldown.contains(&episode.id) {
                    continue;
                }
                if tracker.conflicts(&episode.id, self.cursor_ms, end) {
                    continue;
                }
                if require_unused && self.used_in_block.contains(&episode.id) {
                    continue;
                }
                return Some((pos, episode));
            }
        }
        None
    }

    /// Attempt one movie pick.
    fn try_movie(&mut self, rng: &mut Xoshiro256StarStar, tracker: &mut GlobalTracker) -> bool {
        let bucket_pool: Vec<&'a LibraryItem> = match self.last_bucket {
            Some(bucket) => {
                let same: Vec<&LibraryItem> = self
                    .standalone
                    .iter()
                    .copied()
                    .filter(|m| m.bucket() == bucket)
                    .collect();
                if same.is_empty() { self.standalone.clone() } else { same }
            }
            None => self.standalone.clone(),
        };

        let fitting: Vec<&LibraryItem> = bucket_pool
            .into_iter()
            .filter(|m| {
                let end = self.cursor_ms + m.duration_ms();
                end <= self.end_ms && !tracker.conflicts(&m.id, self.cursor_ms, end)
            })
            .collect();
        if fitting.is_empty() {
            return false;
        }

        // Never replay the movie that just aired if there is any alternative.
        let non_repeat: Vec<&LibraryItem> = fitting
            .iter()
            .copied()
            .filter(|m| Some(m.id.as_str()) != self.last_item_id.as_deref())
            .collect();
        let candidates = if non_repeat.is_empty() { fitting } else { non_repeat };

        // Cooldown is a hard gate in the primary pass; movie-only channels
        // relax it rather than falling back to interstitials.
        let fresh: Vec<&LibraryItem> = candidates
            .iter()
            .copied()
            .filter(|m| !self.cooldown.contains(&m.id))
            .collect();
        let pool = if fresh.is_empty() {
            if self.is_movie_only { candidates } else { return false }
        } else {
            fresh
        };

        // Unused items strictly outrank reruns, so every movie in the pool
        // airs before anything repeats.
        let unused: Vec<&LibraryItem> = pool
            .iter()
            .copied()
            .filter(|m| !self.used_in_block.contains(&m.id))
            .collect();
        let mut scored = if unused.is_empty() { pool } else { unused };
        scored.sort_by_key(|m| (-m.duration_ms(), m.id.clone()));
        scored.truncate(MOVIE_POOL_SIZE);

        let choice = scored[rng.gen_range(0..scored.len())];
        self.commit(choice, tracker);
        true
    }

    /// Fully relaxed pass: any bucket, any cooldown, still no cross-channel
    /// conflicts.
    fn relaxed_pick(&mut self, tracker: &mut GlobalTracker) -> bool {
        match self.best_relaxed_candidate(tracker) {
            Some(item) => {
                self.commit(item, tracker);
                true
            }
            None => false,
        }
    }

    /// After the main loop: repeatedly place the best item that still
    /// fits, then cover whatever remains with one interstitial.
    fn fill_tail(&mut self, tracker: &mut GlobalTracker) {
        for _ in 0..GAP_FILL_ITERATIONS {
            if self.cursor_ms >= self.end_ms {
                break;
            }
            match self.best_relaxed_candidate(tracker) {
                Some(item) => self.commit(item, tracker),
                None => break,
            }
        }
        if self.cursor_ms < self.end_ms {
            let start = self.cursor_ms;
            self.emit_interstitial(start, self.end_ms);
        }
    }

    /// Deterministic fallback choice: longest fitting non-conflicting item,
    /// preferring ones not yet aired this block, then ones that didn't just
    /// air. Keeps degraded blocks from looping a single item.
    fn best_relaxed_candidate(&self, tracker: &GlobalTracker) -> Option<&'a LibraryItem> {
        self.all_items()
            .into_iter()
            .filter(|item| {
                let end = self.cursor_ms + item.duration_ms();
                end <= self.end_ms && !tracker.conflicts(&item.id, self.cursor_ms, end)
            })
            .min_by_key(|item| {
                (
                    self.used_in_block.contains(&item.id),
                    Some(item.id.as_str()) == self.last_item_id.as_deref(),
                    -item.duration_ms(),
                    item.id.clone(),
                )
            })
    }

    /// Give each interstitial that precedes a program a "Next Up" title.
    fn label_interstitials(&mut self) {
        for i in 0..self.programs.len() {
            let next_title = match self.programs.get(i + 1) {
                Some(ScheduleProgram::Program(p)) => Some(p.title.clone()),
                _ => None,
            };
            if let (ScheduleProgram::Interstitial(entry), Some(title)) =
                (&mut self.programs[i], next_title)
            {
                entry.title = format!("Next Up: {title}");
            }
        }
    }

    fn all_items(&self) -> Vec<&'a LibraryItem> {
        let mut all: Vec<&LibraryItem> = self.standalone.clone();
        for episodes in self.series.values() {
            all.extend(episodes.iter().copied());
        }
        all
    }

    fn series_bucket(&self, series_key: &str) -> RatingBucket {
        self.series
            .get(series_key)
            .and_then(|eps| eps.first())
            .map_or(RatingBucket::Adult, |ep| ep.bucket())
    }

    fn series_in_cooldown(&self, series_key: &str) -> bool {
        let Some(episodes) = self.series.get(series_key) else {
            return false;
        };
        let idx = self.series_idx.get(series_key).copied().unwrap_or(0) % episodes.len();
        self.cooldown.contains(&episodes[idx].id)
    }

    fn commit(&mut self, item: &'a LibraryItem, tracker: &mut GlobalTracker) {
        let start = self.cursor_ms;
        let end = start + item.duration_ms();
        let start_dt = DateTime::from_timestamp_millis(start).unwrap_or_default();
        let end_dt = DateTime::from_timestamp_millis(end).unwrap_or_default();
        self.programs.push(ScheduleProgram::program(item, start_dt, end_dt));
        tracker.book(&item.id, start, end);
        self.used_in_block.insert(item.id.clone());
        self.cursor_ms = end;
        self.last_item_id = Some(item.id.clone());
        self.last_bucket = Some(item.bucket());
    }

    fn emit_interstitial(&mut self, start_ms: i64, end_ms: i64) {
        let start = DateTime::from_timestamp_millis(start_ms).unwrap_or_default();
        let end = DateTime::from_timestamp_millis(end_ms).unwrap_or_default();
        self.programs
            .push(ScheduleProgram::interstitial("Coming Up Next", start, end));
        self.cursor_ms = end_ms;
        // Bucket continuity resets across interstitials.
        self.last_bucket = None;
        self.last_item_id = None;
        self.last_series = None;
    }
}

/// Schedule maintenance service: extension, periodic upkeep, cleanup and
/// regeneration over the store.
pub struct Scheduler {
    channels: ChannelRepository,
    blocks: BlockRepository,
    settings: SettingsService,
    library: Arc<LibraryIndex>,
    schedule: ScheduleConfig,
    broadcaster: Arc<Broadcaster>,
}

impl Scheduler {
    #[must_use]
    pub fn new(
        channels: ChannelRepository,
        blocks: BlockRepository,
        settings: SettingsService,
        library: Arc<LibraryIndex>,
        schedule: ScheduleConfig,
        broadcaster: Arc<Broadcaster>,
    ) -> Self {
        Self { channels, blocks, settings, library, schedule, broadcaster }
    }

    /// Generate (and persist) one block for a channel, booking it into the
    /// shared tracker.
    pub async fn generate_and_store(
        &self,
        channel: &Channel,
        block_start: DateTime<Utc>,
        tracker: &mut GlobalTracker,
    ) -> Result<ScheduleBlock> {
        let snapshot = self.library.current();
        let mut items = snapshot.resolve(&channel.item_ids);

        let filters = self.settings.global_filters().await?;
        if filters.rating_filter.is_active() {
            // With a rating filter in force, unrated content is not aired.
            items.retain(|item| {
                item.official_rating
                    .as_deref()
                    .is_some_and(|r| !r.eq_ignore_ascii_case("not rated"))
            });
        }

        let window = Duration::hours(cooldown_hours(&items));
        let cooldown = self
            .blocks
            .item_ids_in_range(channel.number, block_start - window, block_start)
            .await?;

        let block = generate_block(
            channel.number,
            block_start,
            self.schedule.block_hours,
            &items,
            &cooldown,
            tracker,
        )
        .await;
        self.blocks.upsert(&block).await?;
        Ok(block)
    }

    /// Block starts needed so 24 hours of content exist from
    /// `blockStart(now)` forward.
    fn window_starts(&self, now: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        let mut starts = Vec::new();
        let mut start = clock::block_start(now, self.schedule.day_start_hour);
        let horizon = now + Duration::hours(24);
        while start < horizon {
            starts.push(start);
            start = clock::next_block_start(start, self.schedule.block_hours);
        }
        starts
    }

    /// Ensure every channel has blocks covering 24 hours ahead. One shared
    /// tracker spans the pass, so later channels see earlier bookings.
    pub async fn extend_schedules(&self, now: DateTime<Utc>) -> Result<usize> {
        let channels = self.channels.list().await?;
        if channels.is_empty() {
            return Ok(0);
        }
        let starts = self.window_starts(now);
        let window_start = starts[0];
        let window_end =
            clock::block_end(*starts.last().unwrap_or(&window_start), self.schedule.block_hours);

        let existing = self.blocks.all_in_range(window_start, window_end).await?;
        let mut tracker = GlobalTracker::from_blocks(&existing);

        let total = channels.len();
        let mut generated = 0;
        for (i, channel) in channels.iter().enumerate() {
            for &start in &starts {
                if self.blocks.get(channel.number, start).await?.is_none() {
                    self.generate_and_store(channel, start, &mut tracker).await?;
                    generated += 1;
                }
            }
            self.broadcaster.send(Envelope::generation_progress(
                "schedule",
                &format!("Scheduled {}", channel.name),
                Some(i + 1),
                Some(total),
            ));
            tokio::task::yield_now().await;
        }
        if generated > 0 {
            tracing::info!(generated, "Extended schedules");
        }
        Ok(generated)
    }

    /// 15-minute upkeep: keep current and next blocks present, and within
    /// an hour of a block boundary eagerly generate the block after next.
    pub async fn maintain_schedules(&self, now: DateTime<Utc>) -> Result<usize> {
        let channels = self.channels.list().await?;
        if channels.is_empty() {
            return Ok(0);
        }
        let current_start = clock::block_start(now, self.schedule.day_start_hour);
        let current_end = clock::block_end(current_start, self.schedule.block_hours);
        let mut starts = vec![
            current_start,
            clock::next_block_start(current_start, self.schedule.block_hours),
        ];
        if current_end - now <= Duration::hours(1) {
            starts.push(starts[1] + Duration::hours(self.schedule.block_hours));
        }

        let window_end = clock::block_end(*starts.last().unwrap_or(&current_start), self.schedule.block_hours);
        let existing = self.blocks.all_in_range(current_start, window_end).await?;
        let mut tracker = GlobalTracker::from_blocks(&existing);

        let mut generated = 0;
        for channel in &channels {
            for &start in &starts {
                if self.blocks.get(channel.number, start).await?.is_none() {
                    self.generate_and_store(channel, start, &mut tracker).await?;
                    generated += 1;
                }
            }
            tokio::task::yield_now().await;
        }
        Ok(generated)
    }

    /// Drop blocks that ended more than 24 hours ago.
    pub async fn clean_old_blocks(&self, now: DateTime<Utc>) -> Result<u64> {
        self.blocks.clean_older_than(now - Duration::hours(24)).await
    }

    /// Wipe and rebuild every channel's schedule.
    pub async fn regenerate_all(&self, now: DateTime<Utc>) -> Result<usize> {
        self.blocks.delete_all().await?;
        let generated = self.extend_schedules(now).await?;
        Ok(generated)
    }

    /// Rebuild one channel's schedule against the other channels' bookings.
    pub async fn regenerate_channel(&self, channel_number: i64, now: DateTime<Utc>) -> Result<usize> {
        let channel = self.channels.get(channel_number).await?;
        self.blocks.delete_for_channel(channel_number).await?;

        let starts = self.window_starts(now);
        let window_start = starts[0];
        let window_end =
            clock::block_end(*starts.last().unwrap_or(&window_start), self.schedule.block_hours);
        let existing = self.blocks.all_in_range(window_start, window_end).await?;
        let mut tracker = GlobalTracker::from_blocks(&existing);

        let mut generated = 0;
        for &start in &starts {
            self.generate_and_store(&channel, start, &mut tracker).await?;
            generated += 1;
        }
        Ok(generated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::library::UserState;

    fn start() -> DateTime<Utc> {
        "2026-02-11T04:00:00Z".parse().unwrap()
    }

    fn movie(id: &str, hours: i64, rating: Option<&str>) -> LibraryItem {
        LibraryItem {
            id: id.to_string(),
            kind: ItemKind::Movie,
            name: format!("Movie {id}"),
            series_id: None,
            series_name: None,
            season: None,
            episode: None,
            run_time_ticks: hours * 36_000_000_000,
            genres: vec!["Action".to_string()],
            official_rating: rating.map(String::from),
            production_year: Some(1994),
            date_added: None,
            studios: vec![],
            people: vec![],
            user_state: UserState::default(),
        }
    }

    fn episode(series: &str, season: i32, number: i32, rating: Option<&str>) -> LibraryItem {
        LibraryItem {
            id: format!("{series}-s{season}e{number}"),
            kind: ItemKind::Episode,
            name: format!("Episode {number}"),
            series_id: Some(series.to_string()),
            series_name: Some(series.to_string()),
            season: Some(season),
            episode: Some(number),
            run_time_ticks: 13_200_000_000, // 22 minutes
            genres: vec!["Comedy".to_string()],
            official_rating: rating.map(String::from),
            production_year: Some(1996),
            date_added: None,
            studios: vec![],
            people: vec![],
            user_state: UserState::default(),
        }
    }

    async fn generate(
        channel: i64,
        items: &[LibraryItem],
        tracker: &mut GlobalTracker,
    ) -> ScheduleBlock {
        generate_block(channel, start(), 24, items, &HashSet::new(), tracker).await
    }

    fn assert_tiles_exactly(block: &ScheduleBlock) {
        let total: i64 = block.programs.iter().map(ScheduleProgram::duration_ms).sum();
        assert_eq!(total, 24 * 3_600_000, "programs must tile the block");
        let mut cursor = block.block_start;
        for program in &block.programs {
            assert_eq!(program.start_time(), cursor, "no gaps or overlaps");
            assert!(program.end_time() > program.start_time());
            cursor = program.end_time();
        }
        assert_eq!(cursor, block.block_end);
    }

    #[tokio::test]
    async fn empty_channel_yields_empty_block() {
        let mut tracker = GlobalTracker::new();
        let block = generate(1, &[], &mut tracker).await;
        assert!(block.programs.is_empty());
        assert!(!block.seed.is_empty());
        assert_eq!(block.block_end, block.block_start + Duration::hours(24));
    }

    #[tokio::test]
    async fn movie_only_channel_uses_all_movies_without_self_repeat() {
        let movies: Vec<LibraryItem> =
            (1..=5).map(|i| movie(&format!("m{i}"), 2, Some("PG"))).collect();
        let mut tracker = GlobalTracker::new();
        let block = generate(1, &movies, &mut tracker).await;

        assert_tiles_exactly(&block);

        let aired: Vec<&str> = block.programs.iter().filter_map(ScheduleProgram::item_id).collect();
        for i in 1..=5 {
            let id = format!("m{i}");
            assert!(aired.contains(&id.as_str()), "{id} should air");
        }
        for pair in aired.windows(2) {
            assert_ne!(pair[0], pair[1], "no immediate self-repeat");
        }

        let program_ms: i64 = block
            .programs
            .iter()
            .filter(|p| p.is_program())
            .map(ScheduleProgram::duration_ms)
            .sum();
        assert!(program_ms >= 23 * 3_600_000, "at most one short tail interstitial");
        let interstitials = block.programs.iter().filter(|p| !p.is_program()).count();
        assert!(interstitials <= 1);
    }

    #[tokio::test]
    async fn generation_is_deterministic() {
        let mut items: Vec<LibraryItem> =
            (1..=8).map(|i| movie(&format!("m{i}"), 2, Some("PG"))).collect();
        for series in ["alpha", "beta"] {
            for e in 1..=12 {
                items.push(episode(series, 1, e, Some("TV-PG")));
            }
        }

        let first = generate(7, &items, &mut GlobalTracker::new()).await;
        let second = generate(7, &items, &mut GlobalTracker::new()).await;

        assert_eq!(first.seed, second.seed);
        assert_eq!(first.programs.len(), second.programs.len());
        for (a, b) in first.programs.iter().zip(second.programs.iter()) {
            assert_eq!(a, b);
        }
    }

    #[tokio::test]
    async fn different_channels_get_different_sequences() {
        let movies: Vec<LibraryItem> =
            (1..=10).map(|i| movie(&format!("m{i}"), 2, Some("PG"))).collect();
        let a = generate(1, &movies, &mut GlobalTracker::new()).await;
        let b = generate(2, &movies, &mut GlobalTracker::new()).await;
        assert_ne!(a.seed, b.seed);
        let ids_a: Vec<_> = a.programs.iter().filter_map(ScheduleProgram::item_id).collect();
        let ids_b: Vec<_> = b.programs.iter().filter_map(ScheduleProgram::item_id).collect();
        assert_ne!(ids_a, ids_b);
    }

    #[tokio::test]
    async fn cross_channel_overlaps_never_share_items() {
        let movies: Vec<LibraryItem> =
            (1..=5).map(|i| movie(&format!("m{i}"), 2, Some("PG"))).collect();
        let mut tracker = GlobalTracker::new();
        let first = generate(1, &movies, &mut tracker).await;
        let second = generate(2, &movies, &mut tracker).await;

        for a in first.programs.iter().filter(|p| p.is_program()) {
            for b in second.programs.iter().filter(|p| p.is_program()) {
                let overlap =
                    a.start_time() < b.end_time() && a.end_time() > b.start_time();
                if overlap {
                    assert_ne!(a.item_id(), b.item_id(), "{:?} double-booked", a.item_id());
                }
            }
        }
    }

    #[tokio::test]
    async fn rating_buckets_do_not_mix_between_adjacent_programs() {
        let mut items: Vec<LibraryItem> = Vec::new();
        for i in 1..=4 {
            items.push(movie(&format!("kid{i}"), 1, Some("G")));
            items.push(movie(&format!("adult{i}"), 1, Some("R")));
        }
        for e in 1..=10 {
            items.push(episode("kidshow", 1, e, Some("TV-Y")));
            items.push(episode("grownups", 1, e, Some("TV-MA")));
        }

        let block = generate(3, &items, &mut GlobalTracker::new()).await;
        let mut previous: Option<RatingBucket> = None;
        for program in &block.programs {
            match program {
                ScheduleProgram::Program(p) => {
                    let bucket = RatingBucket::for_rating(p.rating.as_deref());
                    if let Some(prev) = previous {
                        assert_eq!(prev, bucket, "adjacent programs must share a bucket");
                    }
                    previous = Some(bucket);
                }
                ScheduleProgram::Interstitial(_) => previous = None,
            }
        }
    }

    #[tokio::test]
    async fn consecutive_programs_from_different_series_unless_in_run() {
        let mut items: Vec<LibraryItem> = Vec::new();
        for series in ["alpha", "beta", "gamma"] {
            for e in 1..=15 {
                items.push(episode(series, 1, e, Some("TV-PG")));
            }
        }
        let block = generate(4, &items, &mut GlobalTracker::new()).await;

        // Runs of one series never repeat the same episode.
        let programs: Vec<_> = block.programs.iter().filter(|p| p.is_program()).collect();
        for pair in programs.windows(2) {
            if pair[0].series_id() == pair[1].series_id() {
                assert_ne!(pair[0].item_id(), pair[1].item_id());
            }
        }
    }

    #[tokio::test]
    async fn episode_runs_air_in_order_within_a_run() {
        let items: Vec<LibraryItem> = (1..=20).map(|e| episode("solo", 1, e, None)).collect();
        let block = generate(5, &items, &mut GlobalTracker::new()).await;
        assert_tiles_exactly(&block);

        // With one series, consecutive distinct episodes advance in episode
        // order (wrapping at the season end).
        let numbers: Vec<i64> = block
            .programs
            .iter()
            .filter_map(ScheduleProgram::item_id)
            .map(|id| id.rsplit('e').next().unwrap().parse::<i64>().unwrap())
            .collect();
        assert!(numbers.len() > 10);
        for pair in numbers.windows(2) {
            let expected = if pair[0] == 20 { 1 } else { pair[0] + 1 };
            assert_eq!(pair[1], expected, "episodes advance sequentially");
        }
    }

    #[tokio::test]
    async fn cooldown_items_are_avoided_in_primary_pass() {
        let movies: Vec<LibraryItem> =
            (1..=6).map(|i| movie(&format!("m{i}"), 2, Some("PG"))).collect();
        let cooldown: HashSet<String> = ["m1".to_string(), "m2".to_string()].into();
        let mut tracker = GlobalTracker::new();
        let block = generate_block(1, start(), 24, &movies, &cooldown, &mut tracker).await;

        // 4 fresh movies × 2 h = 8 h fills the first part of the day; the
        // cooled-down items may only appear once fresh options are reused.
        let first_four: Vec<&str> = block
            .programs
            .iter()
            .filter_map(ScheduleProgram::item_id)
            .take(4)
            .collect();
        assert!(!first_four.contains(&"m1"));
        assert!(!first_four.contains(&"m2"));
    }

    #[tokio::test]
    async fn single_movie_repeats_back_to_back_when_alone() {
        let items = vec![movie("long", 3, Some("PG"))];
        let block = generate(6, &items, &mut GlobalTracker::new()).await;
        assert_tiles_exactly(&block);
        // With no alternative the no-repeat preference yields; 3 h divides
        // 24 h so the single movie tiles the whole block.
        assert!(block.programs.iter().all(ScheduleProgram::is_program));
        assert_eq!(block.programs.len(), 8);
    }

    #[tokio::test]
    async fn interstitials_announce_next_program() {
        let items = vec![movie("only", 7, Some("PG"))];
        let block = generate(8, &items, &mut GlobalTracker::new()).await;
        for (i, program) in block.programs.iter().enumerate() {
            if let ScheduleProgram::Interstitial(entry) = program {
                match block.programs.get(i + 1) {
                    Some(ScheduleProgram::Program(next)) => {
                        assert_eq!(entry.title, format!("Next Up: {}", next.title));
                    }
                    _ => assert_eq!(entry.title, "Coming Up Next"),
                }
            }
        }
    }

    #[tokio::test]
    async fn zero_duration_items_are_skipped() {
        let mut broken = movie("broken", 0, Some("PG"));
        broken.run_time_ticks = 0;
        let items = vec![broken, movie("good", 2, Some("PG"))];
        let block = generate(9, &items, &mut GlobalTracker::new()).await;
        assert!(block
            .programs
            .iter()
            .filter_map(ScheduleProgram::item_id)
            .all(|id| id == "good"));
    }

    #[test]
    fn tracker_overlap_semantics() {
        let mut tracker = GlobalTracker::new();
        tracker.book("x", 100, 200);
        assert!(tracker.conflicts("x", 150, 250));
        assert!(tracker.conflicts("x", 50, 101));
        assert!(!tracker.conflicts("x", 200, 300), "touching intervals do not overlap");
        assert!(!tracker.conflicts("x", 0, 100));
        assert!(!tracker.conflicts("y", 100, 200));
    }

    #[test]
    fn cooldown_window_depends_on_content_mix() {
        let movies = vec![movie("m", 2, None)];
        assert_eq!(cooldown_hours(&movies), MOVIE_ONLY_COOLDOWN_HOURS);
        let mixed = vec![movie("m", 2, None), episode("s", 1, 1, None)];
        assert_eq!(cooldown_hours(&mixed), COOLDOWN_HOURS);
        let shows = vec![episode("s", 1, 1, None)];
        assert_eq!(cooldown_hours(&shows), COOLDOWN_HOURS);
    }

    mod service {
        use super::*;
        use crate::config::ScheduleConfig;
        use crate::repository::test_support::test_pool;
        use crate::repository::{ChannelDraft, SettingsRepository};
        use crate::service::library_index::LibrarySnapshot;
        use crate::models::ChannelKind;

        async fn scheduler_with_channel(items: Vec<LibraryItem>) -> (Scheduler, Channel) {
            let pool = test_pool().await;
            let channels = ChannelRepository::new(pool.clone());
            let blocks = BlockRepository::new(pool.clone());
            let settings = SettingsService::new(SettingsRepository::new(pool));
            let library = Arc::new(LibraryIndex::new());
            let item_ids: Vec<String> = items.iter().map(|i| i.id.clone()).collect();
            library.swap(LibrarySnapshot::new(items, Utc::now()));

            let channel = channels
                .insert(&ChannelDraft {
                    name: "Test Channel".to_string(),
                    kind: ChannelKind::Preset,
                    preset_id: None,
                    filter: None,
                    item_ids,
                    sort_order: 0,
                    ai_prompt: None,
                })
                .await
                .unwrap();

            let scheduler = Scheduler::new(
                channels,
                blocks,
                settings,
                library,
                ScheduleConfig::default(),
                Arc::new(Broadcaster::new()),
            );
            (scheduler, channel)
        }

        #[tokio::test]
        async fn extension_covers_a_day_from_block_start() {
            let movies: Vec<LibraryItem> =
                (1..=6).map(|i| movie(&format!("m{i}"), 2, Some("PG"))).collect();
            let (scheduler, channel) = scheduler_with_channel(movies).await;

            // 09:00 with day-start 04: the current block plus the next one.
            let now: DateTime<Utc> = "2026-02-11T09:00:00Z".parse().unwrap();
            let generated = scheduler.extend_schedules(now).await.unwrap();
            assert_eq!(generated, 2);

            let current = scheduler
                .blocks
                .get(channel.number, "2026-02-11T04:00:00Z".parse().unwrap())
                .await
                .unwrap();
            let next = scheduler
                .blocks
                .get(channel.number, "2026-02-12T04:00:00Z".parse().unwrap())
                .await
                .unwrap();
            assert!(current.is_some());
            assert!(next.is_some(), "at least one block beyond the current one");

            // Idempotent: a second pass generates nothing new.
            assert_eq!(scheduler.extend_schedules(now).await.unwrap(), 0);
        }

        #[tokio::test]
        async fn regenerating_a_block_reproduces_it_exactly() {
            let movies: Vec<LibraryItem> =
                (1..=6).map(|i| movie(&format!("m{i}"), 2, Some("PG"))).collect();
            let (scheduler, channel) = scheduler_with_channel(movies).await;
            let now: DateTime<Utc> = "2026-02-11T09:00:00Z".parse().unwrap();

            scheduler.extend_schedules(now).await.unwrap();
            let block_start: DateTime<Utc> = "2026-02-11T04:00:00Z".parse().unwrap();
            let before = scheduler.blocks.get(channel.number, block_start).await.unwrap().unwrap();

            scheduler.blocks.delete_for_channel(channel.number).await.unwrap();
            scheduler.extend_schedules(now).await.unwrap();
            let after = scheduler.blocks.get(channel.number, block_start).await.unwrap().unwrap();

            assert_eq!(before.seed, after.seed);
            assert_eq!(before.programs, after.programs);
        }

        #[tokio::test]
        async fn maintenance_near_block_end_generates_ahead() {
            let movies: Vec<LibraryItem> =
                (1..=6).map(|i| movie(&format!("m{i}"), 2, Some("PG"))).collect();
            let (scheduler, channel) = scheduler_with_channel(movies).await;

            // 03:30 with day-start 04: within an hour of the block boundary.
            let now: DateTime<Utc> = "2026-02-11T03:30:00Z".parse().unwrap();
            let generated = scheduler.maintain_schedules(now).await.unwrap();
            assert_eq!(generated, 3);

            let eager = scheduler
                .blocks
                .get(channel.number, "2026-02-12T04:00:00Z".parse().unwrap())
                .await
                .unwrap();
            assert!(eager.is_some(), "block after next generated eagerly");
        }

        #[tokio::test]
        async fn cleanup_uses_24h_cutoff() {
            let movies: Vec<LibraryItem> = (1..=6).map(|i| movie(&format!("m{i}"), 2, None)).collect();
            let (scheduler, _channel) = scheduler_with_channel(movies).await;
            let old_now: DateTime<Utc> = "2026-02-09T09:00:00Z".parse().unwrap();
            scheduler.extend_schedules(old_now).await.unwrap();

            // Two days later everything from that pass has expired.
            let now: DateTime<Utc> = "2026-02-12T09:00:00Z".parse().unwrap();
            let removed = scheduler.clean_old_blocks(now).await.unwrap();
            assert_eq!(removed, 2);
        }
    }
}
