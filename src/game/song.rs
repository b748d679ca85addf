use std::path::PathBuf;

/// A BPM change taking effect at `beat`.
#[derive(Debug, Clone, Copy)]
pub struct BpmSegment {
    pub beat: f32,
    pub bpm: f32,
}

/// A freeze: the beat holds still at `beat` for `duration` seconds.
#[derive(Debug, Clone, Copy)]
pub struct StopSegment {
    pub beat: f32,
    pub duration: f32,
}

/// Beat <-> time conversion data for one song. BPM segments are a step
/// function over beats; stops freeze the beat in place.
#[derive(Debug, Clone)]
pub struct TimingData {
    /// Seconds of audio before beat 0.
    pub offset: f32,
    /// Must be non-empty and sorted by beat, first segment at beat 0.
    pub bpms: Vec<BpmSegment>,
    /// Sorted by beat.
    pub stops: Vec<StopSegment>,
}

impl TimingData {
    pub fn with_bpm(bpm: f32) -> Self {
        Self {
            offset: 0.0,
            bpms: vec![BpmSegment { beat: 0.0, bpm }],
            stops: Vec::new(),
        }
    }

    pub fn get_bpm_for_beat(&self, beat: f32) -> f32 {
        let mut bpm = self.bpms.first().map_or(120.0, |s| s.bpm);
        for seg in &self.bpms {
            if seg.beat > beat {
                break;
            }
            bpm = seg.bpm;
        }
        bpm
    }

    /// Walks the BPM/stop event list and returns (beat, bps, freeze) for an
    /// elapsed song time. Inside a stop the beat holds at the stop's beat and
    /// `freeze` is true.
    pub fn get_beat_and_bps_from_elapsed_time(&self, elapsed: f32) -> (f32, f32, bool) {
        let mut time = elapsed + self.offset;
        let mut beat = 0.0_f32;
        let mut bps = self.get_bpm_for_beat(0.0) / 60.0;

        let mut bpm_idx = 0_usize;
        let mut stop_idx = 0_usize;

        // Consume the initial segment at beat 0, if present.
        if self
            .bpms
            .first()
            .is_some_and(|s| s.beat <= 0.0)
        {
            bpm_idx = 1;
        }

        loop {
            // Next event in beat order: a BPM change or a stop.
            let next_bpm_beat = self.bpms.get(bpm_idx).map(|s| s.beat);
            let next_stop_beat = self.stops.get(stop_idx).map(|s| s.beat);

            let (event_beat, is_stop) = match (next_bpm_beat, next_stop_beat) {
                (None, None) => break,
                (Some(b), None) => (b, false),
                (None, Some(s)) => (s, true),
                // A stop at the same beat as a BPM change runs after the change.
                (Some(b), Some(s)) => {
                    if b <= s {
                        (b, false)
                    } else {
                        (s, true)
                    }
                }
            };

            let seconds_to_event = (event_beat - beat) / bps;
            if time < seconds_to_event {
                break;
            }

            time -= seconds_to_event;
            beat = event_beat;

            if is_stop {
                let stop = self.stops[stop_idx];
                stop_idx += 1;
                if time < stop.duration {
                    return (beat, bps, true);
                }
                time -= stop.duration;
            } else {
                bps = self.bpms[bpm_idx].bpm / 60.0;
                bpm_idx += 1;
            }
        }

        (beat + time * bps, bps, false)
    }

    pub fn get_beat_from_elapsed_time(&self, elapsed: f32) -> f32 {
        self.get_beat_and_bps_from_elapsed_time(elapsed).0
    }

    /// Inverse of `get_beat_from_elapsed_time`. Stops strictly before the
    /// target beat contribute their full duration.
    pub fn get_elapsed_time_from_beat(&self, target_beat: f32) -> f32 {
        let mut time = -self.offset;
        let mut beat = 0.0_f32;
        let mut bps = self.get_bpm_for_beat(0.0) / 60.0;

        for seg in &self.bpms {
            if seg.beat <= 0.0 {
                bps = seg.bpm / 60.0;
                continue;
            }
            if seg.beat >= target_beat {
                break;
            }
            time += (seg.beat - beat) / bps;
            beat = seg.beat;
            bps = seg.bpm / 60.0;
        }
        time += (target_beat - beat) / bps;

        for stop in &self.stops {
            if stop.beat < target_beat {
                time += stop.duration;
            }
        }

        time
    }
}

/// Static facts about the current song. Everything the session state needs is
/// scalar or timing data; parsing lives elsewhere.
#[derive(Debug, Clone)]
pub struct SongData {
    pub title: String,
    pub translit_title: String,
    pub artist: String,
    pub banner_path: Option<PathBuf>,
    pub background_path: Option<PathBuf>,
    pub first_beat: f32,
    pub last_beat: f32,
    /// Playable length; drives per-song stage weighting (long/marathon songs
    /// count as multiple arcade stages).
    pub length_seconds: f32,
    pub timing: TimingData,
}

impl SongData {
    pub fn new(title: &str, artist: &str, timing: TimingData) -> Self {
        Self {
            title: title.to_string(),
            translit_title: String::new(),
            artist: artist.to_string(),
            banner_path: None,
            background_path: None,
            first_beat: 0.0,
            last_beat: 1.0,
            length_seconds: 0.0,
            timing,
        }
    }

    pub fn display_title(&self, translit: bool) -> &str {
        if translit && !self.translit_title.trim().is_empty() {
            self.translit_title.as_str()
        } else {
            self.title.as_str()
        }
    }

    /// Marathon songs eat three stages, long songs two, everything else one.
    pub fn num_stages(&self) -> i32 {
        if self.length_seconds > 60.0 * 5.0 {
            3
        } else if self.length_seconds > 60.0 * 2.5 {
            2
        } else {
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BpmSegment, SongData, StopSegment, TimingData};

    #[test]
    fn constant_bpm_converts_both_directions() {
        let timing = TimingData::with_bpm(120.0);
        // 120 BPM = 2 beats per second.
        let (beat, bps, freeze) = timing.get_beat_and_bps_from_elapsed_time(3.0);
        assert!((beat - 6.0).abs() < 1e-4, "got beat {beat}");
        assert!((bps - 2.0).abs() < 1e-6);
        assert!(!freeze);
        assert!((timing.get_elapsed_time_from_beat(6.0) - 3.0).abs() < 1e-4);
    }

    #[test]
    fn bpm_change_is_honored_after_its_beat() {
        let timing = TimingData {
            offset: 0.0,
            bpms: vec![
                BpmSegment { beat: 0.0, bpm: 60.0 },
                BpmSegment { beat: 4.0, bpm: 120.0 },
            ],
            stops: Vec::new(),
        };
        // 4 beats at 60 BPM take 4s; 2 more seconds at 120 BPM add 4 beats.
        let beat = timing.get_beat_from_elapsed_time(6.0);
        assert!((beat - 8.0).abs() < 1e-4, "got beat {beat}");
        let time = timing.get_elapsed_time_from_beat(8.0);
        assert!((time - 6.0).abs() < 1e-4, "got time {time}");
    }

    #[test]
    fn stop_freezes_the_beat_for_its_duration() {
        let timing = TimingData {
            offset: 0.0,
            bpms: vec![BpmSegment { beat: 0.0, bpm: 60.0 }],
            stops: vec![StopSegment { beat: 2.0, duration: 1.5 }],
        };
        let (beat, _, freeze) = timing.get_beat_and_bps_from_elapsed_time(2.5);
        assert!((beat - 2.0).abs() < 1e-4, "beat should hold during the stop");
        assert!(freeze);
        // After the stop ends, time resumes advancing the beat.
        let (beat, _, freeze) = timing.get_beat_and_bps_from_elapsed_time(4.5);
        assert!((beat - 3.0).abs() < 1e-4, "got beat {beat}");
        assert!(!freeze);
        // The inverse conversion accounts for the stop.
        let time = timing.get_elapsed_time_from_beat(3.0);
        assert!((time - 4.5).abs() < 1e-4, "got time {time}");
    }

    #[test]
    fn offset_shifts_beat_zero() {
        let mut timing = TimingData::with_bpm(120.0);
        timing.offset = 1.0;
        let beat = timing.get_beat_from_elapsed_time(0.0);
        assert!((beat - 2.0).abs() < 1e-4, "got beat {beat}");
        let time = timing.get_elapsed_time_from_beat(2.0);
        assert!(time.abs() < 1e-4, "got time {time}");
    }

    #[test]
    fn num_stages_scales_with_song_length() {
        let mut song = SongData::new("Test", "Artist", TimingData::with_bpm(120.0));
        song.length_seconds = 100.0;
        assert_eq!(song.num_stages(), 1);
        song.length_seconds = 200.0;
        assert_eq!(song.num_stages(), 2);
        song.length_seconds = 400.0;
        assert_eq!(song.num_stages(), 3);
    }
}
