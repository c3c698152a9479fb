// THEORY:
// The label vocabulary shared by every stage. A `Label` is the raw byte a
// classifier writes into a label image; `BodyPart` gives those bytes names.
// The blob table has exactly one list per label, so `NUM_PARTS` also fixes the
// outer size of every `BlobMatrix`.

/// A body-part category as stored in a label image.
pub type Label = u8;

/// Number of distinct labels, background included.
pub const NUM_PARTS: usize = 26;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum BodyPart {
    LFoot = 0,
    LLeg,
    LKnee,
    LThigh,
    RFoot,
    RLeg,
    RKnee,
    RThigh,
    RHips,
    LHips,
    Neck,
    RArm,
    RElbow,
    RForearm,
    RHand,
    LArm,
    LElbow,
    LForearm,
    LHand,
    FaceLB,
    FaceRB,
    FaceLT,
    FaceRT,
    RChest,
    LChest,
    Background,
}

impl BodyPart {
    pub const ALL: [BodyPart; NUM_PARTS] = [
        BodyPart::LFoot,
        BodyPart::LLeg,
        BodyPart::LKnee,
        BodyPart::LThigh,
        BodyPart::RFoot,
        BodyPart::RLeg,
        BodyPart::RKnee,
        BodyPart::RThigh,
        BodyPart::RHips,
        BodyPart::LHips,
        BodyPart::Neck,
        BodyPart::RArm,
        BodyPart::RElbow,
        BodyPart::RForearm,
        BodyPart::RHand,
        BodyPart::LArm,
        BodyPart::LElbow,
        BodyPart::LForearm,
        BodyPart::LHand,
        BodyPart::FaceLB,
        BodyPart::FaceRB,
        BodyPart::FaceLT,
        BodyPart::FaceRT,
        BodyPart::RChest,
        BodyPart::LChest,
        BodyPart::Background,
    ];

    pub fn from_label(label: Label) -> Option<BodyPart> {
        Self::ALL.get(label as usize).copied()
    }

    pub fn label(self) -> Label {
        self as Label
    }

    /// The next part up the kinematic chain towards the neck, if any.
    /// The neck is the root; the face and chest hang off it.
    pub fn kinematic_parent(self) -> Option<BodyPart> {
        use BodyPart::*;
        match self {
            LFoot => Some(LLeg),
            LLeg => Some(LKnee),
            LKnee => Some(LThigh),
            LThigh => Some(LHips),
            RFoot => Some(RLeg),
            RLeg => Some(RKnee),
            RKnee => Some(RThigh),
            RThigh => Some(RHips),
            RHips => Some(RChest),
            LHips => Some(LChest),
            RHand => Some(RForearm),
            RForearm => Some(RElbow),
            RElbow => Some(RArm),
            RArm => Some(RChest),
            LHand => Some(LForearm),
            LForearm => Some(LElbow),
            LElbow => Some(LArm),
            LArm => Some(LChest),
            RChest | LChest => Some(Neck),
            FaceLB | FaceRB => Some(Neck),
            FaceLT => Some(FaceLB),
            FaceRT => Some(FaceRB),
            Neck | Background => None,
        }
    }
}

/// Label written for pixels with no depth reading.
pub const BACKGROUND: Label = BodyPart::Background as Label;
