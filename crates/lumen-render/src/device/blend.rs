/// How a source fragment is combined with the framebuffer.
///
/// The `*Npm` variants expect straight (non-premultiplied) alpha sources.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum BlendMode {
    #[default]
    Normal,
    Add,
    Multiply,
    Screen,
    NormalNpm,
    AddNpm,
    ScreenNpm,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstColor,
    DstAlpha,
}

/// Separate color/alpha factors for one blend mode.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct BlendFactors {
    pub src_color: BlendFactor,
    pub dst_color: BlendFactor,
    pub src_alpha: BlendFactor,
    pub dst_alpha: BlendFactor,
}

impl BlendFactors {
    const fn uniform(src: BlendFactor, dst: BlendFactor) -> Self {
        Self { src_color: src, dst_color: dst, src_alpha: src, dst_alpha: dst }
    }

    const fn separate(src: BlendFactor, dst: BlendFactor, src_a: BlendFactor, dst_a: BlendFactor) -> Self {
        Self { src_color: src, dst_color: dst, src_alpha: src_a, dst_alpha: dst_a }
    }
}

impl BlendMode {
    pub const ALL: [BlendMode; 7] = [
        BlendMode::Normal,
        BlendMode::Add,
        BlendMode::Multiply,
        BlendMode::Screen,
        BlendMode::NormalNpm,
        BlendMode::AddNpm,
        BlendMode::ScreenNpm,
    ];

    /// Small integer used as the tracker slot value.
    #[inline]
    pub fn index(self) -> u8 {
        self as u8
    }

    #[inline]
    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    pub fn factors(self) -> BlendFactors {
        use BlendFactor::*;
        match self {
            BlendMode::Normal => BlendFactors::uniform(One, OneMinusSrcAlpha),
            BlendMode::Add => BlendFactors::uniform(One, DstAlpha),
            BlendMode::Multiply => BlendFactors::uniform(DstColor, OneMinusSrcAlpha),
            BlendMode::Screen => BlendFactors::uniform(One, OneMinusSrcColor),
            BlendMode::NormalNpm => BlendFactors::separate(SrcAlpha, OneMinusSrcAlpha, One, OneMinusSrcAlpha),
            BlendMode::AddNpm => BlendFactors::separate(SrcAlpha, DstAlpha, One, DstAlpha),
            BlendMode::ScreenNpm => BlendFactors::separate(SrcAlpha, OneMinusSrcColor, One, OneMinusSrcColor),
        }
    }
}
