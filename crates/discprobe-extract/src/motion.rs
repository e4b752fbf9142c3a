//! Motion stream builder: raw program text to typed motion events
//!
//! Normalizes the line-oriented program into an ordered [`MotionEvent`]
//! stream with modal state tracking: sticky axis values, the active tool,
//! the working unit system, and the side state machine. Inline annotations
//! are matched against a small fixed vocabulary; everything else in
//! parentheses is inert commentary.

use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, trace};

use discprobe_core::model::{Marker, MotionEvent, Side};
use discprobe_core::units::MeasurementSystem;

/// Motion command class in effect (modal)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MotionMode {
    /// Rapid positioning (G00), never a dimension candidate
    Rapid,
    /// Controlled feed (G01)
    Feed,
    /// Circular interpolation (G02/G03), out of scope; tracked only so
    /// modal axis values stay correct across arc lines
    Arc,
}

/// The normalized output of one program's text
#[derive(Debug, Clone)]
pub struct MotionStream {
    /// Program number from the O-number header, if the header was found
    pub program_number: Option<String>,
    /// The free-text title comment, if one was found near the header
    pub title: Option<String>,
    /// Working unit system declared by the program (G20/G21)
    pub working_units: MeasurementSystem,
    /// The motion events, in source order
    pub events: Vec<MotionEvent>,
}

impl MotionStream {
    /// True when the text carried no recognizable program header
    pub fn is_headerless(&self) -> bool {
        self.program_number.is_none()
    }
}

fn word_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([A-Z])\s*(-?(?:\d+\.?\d*|\.\d+))").expect("invalid regex pattern"))
}

fn header_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[O:](\d+)|^(\d{3,6})\s*$").expect("invalid regex pattern"))
}

/// Split a line into its command part and any parenthetical comments
fn split_comments(line: &str) -> (String, Vec<String>) {
    let mut command = String::new();
    let mut comments = Vec::new();
    let mut rest = line;
    loop {
        match rest.find('(') {
            None => {
                command.push_str(rest);
                break;
            }
            Some(start) => {
                command.push_str(&rest[..start]);
                match rest[start..].find(')') {
                    Some(offset) => {
                        comments.push(rest[start + 1..start + offset].trim().to_string());
                        rest = &rest[start + offset + 1..];
                    }
                    None => {
                        // Unmatched parenthesis comments out the rest of
                        // the line.
                        comments.push(rest[start + 1..].trim().to_string());
                        break;
                    }
                }
            }
        }
    }
    // Semicolon comments out the tail of the command part.
    if let Some(pos) = command.find(';') {
        let tail = command[pos + 1..].trim().to_string();
        if !tail.is_empty() {
            comments.push(tail);
        }
        command.truncate(pos);
    }
    (command, comments)
}

fn marker_vocab() -> &'static [(Regex, Marker)] {
    static VOCAB: OnceLock<Vec<(Regex, Marker)>> = OnceLock::new();
    VOCAB.get_or_init(|| {
        [
            (r"\bFLIP\b", Marker::FlipPart),
            (
                r"\b(?:OP\s*2|SIDE\s*2|OPERATION\s*2|2ND\s*OP)\b",
                Marker::SecondOperation,
            ),
            (r"\b(?:CB|CENTER\s*BORE|CTR\s*BORE)\b", Marker::CenterBore),
            (r"\b(?:HUB\s*DIA|HUB)\b", Marker::HubDiameter),
            (r"\b(?:OD|OUTER\s*DIA\w*)\b", Marker::OuterDiameter),
        ]
        .into_iter()
        .map(|(pattern, marker)| {
            (Regex::new(pattern).expect("invalid regex pattern"), marker)
        })
        .collect()
    })
}

/// Match a comment against the recognized annotation vocabulary
///
/// Vocabulary words only match on word boundaries, so inert commentary
/// that merely contains the letters ("GOOD PART", "SCRAP CBN INSERT")
/// stays inert. Dots are stripped first ("C.B." reads as "CB").
fn recognize_marker(comment: &str) -> Option<Marker> {
    let text = comment.to_uppercase().replace('.', "");
    marker_vocab()
        .iter()
        .find(|(re, _)| re.is_match(&text))
        .map(|(_, marker)| *marker)
}

/// Whether a comment is plausible free-text title material rather than a
/// marker or pure machine chatter
fn looks_like_title(comment: &str) -> bool {
    comment.len() >= 6 && comment.chars().filter(|c| c.is_ascii_alphabetic()).count() >= 3
}

/// Build the normalized motion stream from raw program text
pub fn build_stream(text: &str) -> MotionStream {
    let mut program_number = None;
    let mut title: Option<String> = None;
    let mut working_units = MeasurementSystem::Metric;

    let mut motion_mode = MotionMode::Rapid;
    let mut modal_x: Option<f64> = None;
    let mut modal_z: Option<f64> = None;
    let mut feed_rate: Option<f64> = None;
    let mut active_tool: Option<String> = None;
    let mut side = Side::Side1;
    // Markers from comment-only lines carry forward to the next motion.
    let mut pending_markers: Vec<Marker> = Vec::new();

    let mut events = Vec::new();

    for (index, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line == "%" {
            continue;
        }

        let (command, comments) = split_comments(line);
        let command = command.trim().to_uppercase();

        // Header: the identifying O-number, only before any motion.
        let mut header_on_this_line = false;
        if program_number.is_none() && events.is_empty() {
            if let Some(caps) = header_regex().captures(&command) {
                let number = caps
                    .get(1)
                    .or_else(|| caps.get(2))
                    .map(|m| m.as_str().to_string());
                if let Some(number) = number {
                    debug!(program = %number, "program header");
                    program_number = Some(number);
                    header_on_this_line = true;
                }
            }
        }

        // Comments: title capture, side annotations, dimension markers.
        // Titles virtually always contain marker vocabulary ("72.6 CB" is
        // a nominal dimension, not an inline marker), so the title is
        // captured before marker matching: on the header line, or on a
        // comment-only line before any motion, a title-looking comment is
        // the title. Side annotations keep priority off the header line;
        // dimension markers only bind once motion is in play.
        let mut line_markers: Vec<Marker> = Vec::new();
        let title_position =
            header_on_this_line || (command.is_empty() && events.is_empty());
        for comment in &comments {
            let marker = recognize_marker(comment);
            let side_annotation =
                matches!(marker, Some(Marker::FlipPart | Marker::SecondOperation));
            if title.is_none()
                && title_position
                && looks_like_title(comment)
                && (header_on_this_line || !side_annotation)
            {
                title = Some(comment.clone());
                continue;
            }
            match marker {
                Some(Marker::FlipPart) => {
                    side = side.flipped();
                    trace!(line = index, %side, "flip annotation");
                }
                Some(Marker::SecondOperation) => {
                    side = Side::Side2;
                    trace!(line = index, "operation-2 annotation");
                }
                Some(marker) => line_markers.push(marker),
                None => {}
            }
        }

        if command.is_empty() {
            pending_markers.extend(line_markers);
            continue;
        }

        // Command words, modal updates first.
        let mut has_axis_word = false;
        let mut saw_motion_word = false;
        for caps in word_regex().captures_iter(&command) {
            let letter = caps[1].chars().next().expect("single letter group");
            let Ok(number) = caps[2].parse::<f64>() else {
                continue;
            };
            match letter {
                'G' => {
                    saw_motion_word = true;
                    match number as i64 {
                        0 => motion_mode = MotionMode::Rapid,
                        1 => motion_mode = MotionMode::Feed,
                        2 | 3 => motion_mode = MotionMode::Arc,
                        20 => working_units = MeasurementSystem::Imperial,
                        21 => working_units = MeasurementSystem::Metric,
                        // Secondary work offset selects the second setup;
                        // the machine never transitions back.
                        55 => side = Side::Side2,
                        _ => saw_motion_word = false,
                    }
                }
                'X' => {
                    modal_x = Some(number);
                    has_axis_word = true;
                }
                'Z' => {
                    modal_z = Some(number);
                    has_axis_word = true;
                }
                'F' => feed_rate = Some(number),
                'T' => {
                    let code = caps[2].to_string();
                    trace!(line = index, tool = %code, "tool selection");
                    active_tool = Some(code);
                }
                _ => {}
            }
        }

        // Only actual motion lines become events; arcs are out of scope
        // but their axis words already updated the modal state above.
        if (has_axis_word || saw_motion_word) && motion_mode != MotionMode::Arc {
            let mut markers = std::mem::take(&mut pending_markers);
            markers.extend(line_markers);
            events.push(MotionEvent {
                sequence_index: index,
                is_rapid: motion_mode == MotionMode::Rapid,
                x_value: modal_x,
                z_value: modal_z,
                feed_rate,
                active_tool: active_tool.clone(),
                side,
                markers,
            });
        } else {
            pending_markers.extend(line_markers);
        }
    }

    debug!(
        events = events.len(),
        units = %working_units,
        header = program_number.is_some(),
        "motion stream built"
    );

    MotionStream {
        program_number,
        title,
        working_units,
        events,
    }
}
