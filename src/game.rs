//! Game lookup table
//!
//! Every catalog crawl targets one game. Games are selected on the command line
//! by an integer choice, in the config file by a slug, and addressed on the
//! remote API by a numeric game id. This module maps between all three.

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

/// A game whose map catalog can be mirrored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Game {
    CounterStrikeSource,
    CounterStrikeGlobalOffensive,
    TeamFortress2,
    CounterStrike,
    HalfLife2Deathmatch,
    DayOfDefeatSource,
}

struct GameEntry {
    game: Game,
    choice: u32,
    remote_id: u32,
    slug: &'static str,
    name: &'static str,
}

static ENTRIES: [GameEntry; 6] = [
    GameEntry {
        game: Game::CounterStrikeSource,
        choice: 1,
        remote_id: 2,
        slug: "css",
        name: "Counter-Strike: Source",
    },
    GameEntry {
        game: Game::CounterStrikeGlobalOffensive,
        choice: 2,
        remote_id: 4660,
        slug: "csgo",
        name: "Counter-Strike: Global Offensive",
    },
    GameEntry {
        game: Game::TeamFortress2,
        choice: 3,
        remote_id: 297,
        slug: "tf2",
        name: "Team Fortress 2",
    },
    GameEntry {
        game: Game::CounterStrike,
        choice: 4,
        remote_id: 4254,
        slug: "cs16",
        name: "Counter-Strike 1.6",
    },
    GameEntry {
        game: Game::HalfLife2Deathmatch,
        choice: 5,
        remote_id: 5,
        slug: "hl2dm",
        name: "Half-Life 2: Deathmatch",
    },
    GameEntry {
        game: Game::DayOfDefeatSource,
        choice: 6,
        remote_id: 10,
        slug: "dods",
        name: "Day of Defeat: Source",
    },
];

/// Reverse indexes over [`ENTRIES`], built on first use
struct GameTable {
    by_choice: HashMap<u32, Game>,
    by_remote_id: HashMap<u32, Game>,
    by_slug: HashMap<&'static str, Game>,
}

impl GameTable {
    fn build() -> Self {
        let mut table = Self {
            by_choice: HashMap::with_capacity(ENTRIES.len()),
            by_remote_id: HashMap::with_capacity(ENTRIES.len()),
            by_slug: HashMap::with_capacity(ENTRIES.len()),
        };

        for entry in ENTRIES.iter() {
            table.by_choice.insert(entry.choice, entry.game);
            table.by_remote_id.insert(entry.remote_id, entry.game);
            table.by_slug.insert(entry.slug, entry.game);
        }

        table
    }

    fn get() -> &'static Self {
        static TABLE: OnceLock<GameTable> = OnceLock::new();
        TABLE.get_or_init(Self::build)
    }
}

impl Game {
    /// Looks up a game by its command-line choice number
    pub fn from_choice(choice: u32) -> Option<Self> {
        GameTable::get().by_choice.get(&choice).copied()
    }

    /// Looks up a game by its remote API id
    pub fn from_remote_id(remote_id: u32) -> Option<Self> {
        GameTable::get().by_remote_id.get(&remote_id).copied()
    }

    /// Looks up a game by its config slug (case-insensitive)
    pub fn from_slug(slug: &str) -> Option<Self> {
        let slug = slug.trim().to_ascii_lowercase();
        GameTable::get().by_slug.get(slug.as_str()).copied()
    }

    fn entry(&self) -> &'static GameEntry {
        let index = match self {
            Game::CounterStrikeSource => 0,
            Game::CounterStrikeGlobalOffensive => 1,
            Game::TeamFortress2 => 2,
            Game::CounterStrike => 3,
            Game::HalfLife2Deathmatch => 4,
            Game::DayOfDefeatSource => 5,
        };
        &ENTRIES[index]
    }

    pub fn choice(&self) -> u32 {
        self.entry().choice
    }

    pub fn remote_id(&self) -> u32 {
        self.entry().remote_id
    }

    pub fn slug(&self) -> &'static str {
        self.entry().slug
    }

    pub fn name(&self) -> &'static str {
        self.entry().name
    }

    /// Returns all games in choice order
    pub fn all() -> Vec<Self> {
        ENTRIES.iter().map(|entry| entry.game).collect()
    }
}

impl fmt::Display for Game {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
