//! The frame stack: call frames with static and dynamic links, lexical
//! levels, and locals at offsets computed by the preprocessor.

use super::value::Value;

pub struct Frame {
    pub static_link: usize,
    pub dynamic_link: usize,
    pub lex_level: u32,
    /// Uninitialized locals are `None`, so use before assignment is
    /// detectable.
    pub locals: Vec<Option<Value>>,
}

pub struct FrameStack {
    frames: Vec<Frame>,
    pub max_frames: usize,
}

impl FrameStack {
    pub fn new(max_frames: usize) -> Self {
        FrameStack {
            frames: Vec::new(),
            max_frames,
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Push a frame and initialise its locals as unset.
    pub fn push(&mut self, static_link: usize, lex_level: u32, slots: usize) -> Option<usize> {
        if self.frames.len() >= self.max_frames {
            return None;
        }
        let dynamic_link = self.frames.len().saturating_sub(1);
        self.frames.push(Frame {
            static_link,
            dynamic_link,
            lex_level,
            locals: vec![None; slots],
        });
        Some(self.frames.len() - 1)
    }

    pub fn pop(&mut self) {
        self.frames.pop();
    }

    pub fn truncate(&mut self, depth: usize) {
        self.frames.truncate(depth);
    }

    pub fn frame(&self, i: usize) -> &Frame {
        &self.frames[i]
    }

    pub fn frame_mut(&mut self, i: usize) -> &mut Frame {
        &mut self.frames[i]
    }

    pub fn top_index(&self) -> usize {
        self.frames.len() - 1
    }

    /// Follow static links from the top frame to the frame at `level`.
    pub fn frame_at_level(&self, level: u32) -> Option<usize> {
        let mut i = self.top_index();
        loop {
            let f = &self.frames[i];
            if f.lex_level == level {
                return Some(i);
            }
            if f.lex_level < level || i == 0 {
                return None;
            }
            i = f.static_link;
        }
    }

    pub fn get(&self, frame: usize, offset: usize) -> Option<&Value> {
        self.frames[frame].locals.get(offset)?.as_ref()
    }

    pub fn set(&mut self, frame: usize, offset: usize, value: Value) {
        self.frames[frame].locals[offset] = Some(value);
    }

    /// Every initialised local, for the collector's root scan.
    pub fn roots(&self) -> impl Iterator<Item = &Value> {
        self.frames
            .iter()
            .flat_map(|f| f.locals.iter().flatten())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_links_and_levels() {
        let mut s = FrameStack::new(16);
        let program = s.push(0, 1, 2).unwrap();
        let inner = s.push(program, 2, 1).unwrap();
        assert_eq!(s.frame(inner).static_link, program);
        assert_eq!(s.frame_at_level(2), Some(inner));
        assert_eq!(s.frame_at_level(1), Some(program));
    }

    #[test]
    fn static_links_skip_dynamic_callers() {
        let mut s = FrameStack::new(16);
        let program = s.push(0, 1, 0).unwrap();
        // A routine at level 2 calling another level-2 routine: both link
        // statically to the program frame.
        let _first = s.push(program, 2, 0).unwrap();
        let second = s.push(program, 2, 0).unwrap();
        assert_eq!(s.frame_at_level(2), Some(second));
        assert_eq!(s.frame_at_level(1), Some(program));
    }

    #[test]
    fn locals_start_uninitialised() {
        let mut s = FrameStack::new(16);
        let f = s.push(0, 1, 3).unwrap();
        assert!(s.get(f, 0).is_none());
        s.set(f, 0, Value::Int(5));
        assert!(matches!(s.get(f, 0), Some(Value::Int(5))));
        assert!(s.get(f, 1).is_none());
    }

    #[test]
    fn overflow_is_reported_not_panicked() {
        let mut s = FrameStack::new(2);
        assert!(s.push(0, 1, 0).is_some());
        assert!(s.push(0, 2, 0).is_some());
        assert!(s.push(1, 3, 0).is_none());
    }
}
