mod art;
mod badge;

pub use badge::{Badge, BadgeSource, ShieldSpec};

use thiserror::Error;

use self::art::{
    CABOOSE, CAR_CONTENT_ROW, CAR_CONTENT_ROWS, CAR_INTERIOR_OFFSET, ENGINE, MIN_CAR_INTERIOR,
    PIECE_ROWS,
};

pub const MAX_CARS: usize = 3;
pub const MAX_BADGES_PER_CAR: usize = 3;
pub const MAX_TEXT_LEN: usize = 20;

const TRACK_PATTERN: [char; 2] = ['-', '+'];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("a train carries at most {} cars", MAX_CARS)]
    TooManyCars,
    #[error("a car carries at most {} badges", MAX_BADGES_PER_CAR)]
    TooManyBadges,
    #[error("car text is limited to {} characters", MAX_TEXT_LEN)]
    TextTooLong,
    #[error("not a shields.io badge URL: {0}")]
    InvalidShield(String),
    #[error("not a shields.io URL or local image file: {0}")]
    InvalidBadge(String),
}

/// What a car carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CarContent {
    Badges(Vec<Badge>),
    Text(String),
}

impl CarContent {
    fn interior_width(&self) -> usize {
        match self {
            CarContent::Text(text) => (text.chars().count() + 2).max(MIN_CAR_INTERIOR),
            CarContent::Badges(_) => MIN_CAR_INTERIOR,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainCar {
    content: CarContent,
}

impl TrainCar {
    pub fn text(text: impl Into<String>) -> Result<Self, LayoutError> {
        let text = text.into();
        if text.chars().count() > MAX_TEXT_LEN {
            return Err(LayoutError::TextTooLong);
        }
        Ok(Self {
            content: CarContent::Text(text),
        })
    }

    pub fn badges(badges: Vec<Badge>) -> Result<Self, LayoutError> {
        if badges.len() > MAX_BADGES_PER_CAR {
            return Err(LayoutError::TooManyBadges);
        }
        Ok(Self {
            content: CarContent::Badges(badges),
        })
    }

    pub fn content(&self) -> &CarContent {
        &self.content
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Train {
    cars: Vec<TrainCar>,
    animated: bool,
    additional_track_segments: usize,
}

impl Train {
    pub fn new(cars: Vec<TrainCar>) -> Result<Self, LayoutError> {
        if cars.len() > MAX_CARS {
            return Err(LayoutError::TooManyCars);
        }
        Ok(Self {
            cars,
            animated: false,
            additional_track_segments: 0,
        })
    }

    pub fn animated(mut self, animated: bool) -> Self {
        self.animated = animated;
        self
    }

    pub fn with_track_segments(mut self, segments: usize) -> Self {
        self.additional_track_segments = segments;
        self
    }

    /// Composes the train as it looks at animation step `tick`.
    pub fn layout(&self, tick: u64) -> TrainLayout {
        let mut rows: Vec<String> = ENGINE.iter().map(|r| r.to_string()).collect();
        let mut slots = Vec::with_capacity(self.cars.len());

        for car in &self.cars {
            let column = rows[0].chars().count();
            let interior = car.content.interior_width();
            for (row, piece) in rows.iter_mut().zip(art::car(interior)) {
                row.push_str(&piece);
            }
            slots.push(ContentSlot {
                column: column + CAR_INTERIOR_OFFSET,
                row: CAR_CONTENT_ROW,
                columns: interior,
                rows: CAR_CONTENT_ROWS,
                content: car.content.clone(),
            });
        }

        for (row, piece) in rows.iter_mut().zip(CABOOSE) {
            row.push_str(piece);
        }

        let width = rows[0].chars().count() + self.additional_track_segments * TRACK_PATTERN.len();
        let phase = if self.animated { (tick % 2) as usize } else { 0 };
        rows.push(track(width, phase));

        debug_assert_eq!(rows.len(), PIECE_ROWS + 1);
        TrainLayout { rows, slots }
    }
}

fn track(width: usize, phase: usize) -> String {
    (0..width)
        .map(|i| TRACK_PATTERN[(i + phase) % TRACK_PATTERN.len()])
        .collect()
}

/// A car's content area in character cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentSlot {
    pub column: usize,
    pub row: usize,
    pub columns: usize,
    pub rows: usize,
    pub content: CarContent,
}

/// A composed train: text rows plus the content areas laid over them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainLayout {
    pub rows: Vec<String>,
    pub slots: Vec<ContentSlot>,
}

impl TrainLayout {
    pub fn columns(&self) -> usize {
        self.rows.iter().map(|r| r.chars().count()).max().unwrap_or(0)
    }

    /// The rows with each car's content written into its slot. Badges show
    /// their alt text; anything wider than the slot is cut.
    pub fn plain_text(&self) -> String {
        let mut rows: Vec<Vec<char>> = self.rows.iter().map(|r| r.chars().collect()).collect();
        for slot in &self.slots {
            let label = match &slot.content {
                CarContent::Text(text) => text.clone(),
                CarContent::Badges(badges) => badges
                    .iter()
                    .map(|b| b.alt.as_str())
                    .collect::<Vec<_>>()
                    .join(" "),
            };
            let label: Vec<char> = label.chars().take(slot.columns).collect();
            let start = slot.column + (slot.columns - label.len()) / 2;
            if let Some(row) = rows.get_mut(slot.row) {
                for (i, c) in label.into_iter().enumerate() {
                    if let Some(cell) = row.get_mut(start + i) {
                        *cell = c;
                    }
                }
            }
        }
        rows.into_iter()
            .map(|r| r.into_iter().collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
