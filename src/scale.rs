//! Fixed-point conversions for milli-scaled register values.
//!
//! Quantities such as distances in metres or thresholds are carried as
//! integers scaled by 1000. Conversions to the integer form round to the
//! nearest step, so a value that came out of a register converts back to
//! the same register value. Negative inputs saturate to zero for `u32`.

const MILLI: f32 = 1000.0;

#[inline]
fn round_half_away(value: f32) -> f32 {
    if value < 0.0 { value - 0.5 } else { value + 0.5 }
}

macro_rules! impl_milli {
    ($($type:ty),*) => {
        paste::paste! {
            $(
                #[doc = "Scales `value` by 1000 and rounds it to the nearest `" $type "`."]
                #[inline]
                pub fn [<float_to_ $type _milli>](value: f32) -> $type {
                    round_half_away(value * MILLI) as $type
                }

                #[doc = "Converts a milli-scaled `" $type "` back to its real value."]
                #[inline]
                pub fn [<$type _milli_to_float>](value: $type) -> f32 {
                    value as f32 / MILLI
                }
            )*
        }
    };
}

impl_milli!(u32, i32);
