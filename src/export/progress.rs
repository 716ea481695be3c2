use super::encoder::EncoderEvent;

/// Turns raw encoder signals into whole percentages for display.
///
/// While encoding, emitted values stay within 1..=99 and never decrease or
/// repeat. 100 is only reported once the encoder has finished, so a stalled
/// final frame shows 99.
#[derive(Debug, Default, Clone)]
pub struct ProgressReporter {
    last: Option<u8>,
    done: bool,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, event: &EncoderEvent) -> Option<u8> {
        if self.done {
            return None;
        }
        let percent = match event {
            EncoderEvent::Started => return None,
            EncoderEvent::Progress(fraction) => {
                let fraction = *fraction;
                if !fraction.is_finite() {
                    return None;
                }
                (fraction.clamp(0.0, 1.0) * 100.0).round().clamp(1.0, 99.0) as u8
            }
            EncoderEvent::Finished(_) => {
                self.done = true;
                100
            }
            EncoderEvent::Aborted | EncoderEvent::Errored(_) => {
                self.done = true;
                return None;
            }
        };
        self.emit(percent)
    }

    fn emit(&mut self, percent: u8) -> Option<u8> {
        match self.last {
            Some(last) if percent <= last => None,
            _ => {
                self.last = Some(percent);
                Some(percent)
            }
        }
    }

    pub fn last(&self) -> Option<u8> {
        self.last
    }

    pub fn is_done(&self) -> bool {
        self.done
    }
}

/// Percentages for a whole event stream.
pub fn percentages<I>(events: I) -> Percentages<I::IntoIter>
where
    I: IntoIterator<Item = EncoderEvent>,
{
    Percentages {
        events: events.into_iter(),
        reporter: ProgressReporter::new(),
    }
}

pub struct Percentages<I> {
    events: I,
    reporter: ProgressReporter,
}

impl<I: Iterator<Item = EncoderEvent>> Iterator for Percentages<I> {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        for event in self.events.by_ref() {
            if let Some(percent) = self.reporter.observe(&event) {
                return Some(percent);
            }
            if self.reporter.is_done() {
                return None;
            }
        }
        None
    }
}
