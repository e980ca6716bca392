//! 空间音频计算
//!
//! 定位后端使用的距离衰减与立体声平移：
//! - 距离衰减 (Linear, Inverse, Exponential)
//! - 基于听者右方向的等功率平移
//!
//! 坐标约定与 [`SoundOrigin`] 一致：z 向上，朝向角绕 z 轴。

use super::channel::NORM_SEP;
use super::module::{AdjustedParams, SoundOrigin};
use glam::Vec3;

/// 距离衰减模型
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DistanceModel {
    /// 无衰减 (固定音量)
    None,
    /// 线性衰减: gain = 1 - rolloff * (distance - ref_distance) / (max_distance - ref_distance)
    Linear {
        /// 参考距离 (开始衰减的距离)
        ref_distance: f32,
        /// 最大距离 (完全静音的距离)
        max_distance: f32,
        /// 衰减系数 (0.0 - 1.0)
        rolloff: f32,
    },
    /// 反比衰减: gain = ref_distance / (ref_distance + rolloff * (distance - ref_distance))
    Inverse { ref_distance: f32, rolloff: f32 },
    /// 指数衰减: gain = (distance / ref_distance) ^ -rolloff
    Exponential { ref_distance: f32, rolloff: f32 },
}

impl Default for DistanceModel {
    /// 与经典混音器相同的可听范围：200 单位内满音量，1200 单位外静音
    fn default() -> Self {
        DistanceModel::Linear {
            ref_distance: 200.0,
            max_distance: 1200.0,
            rolloff: 1.0,
        }
    }
}

impl DistanceModel {
    /// 计算指定距离的增益值
    pub fn calculate_gain(&self, distance: f32) -> f32 {
        match *self {
            DistanceModel::None => 1.0,

            DistanceModel::Linear {
                ref_distance,
                max_distance,
                rolloff,
            } => {
                if distance <= ref_distance {
                    1.0
                } else if distance >= max_distance {
                    0.0
                } else {
                    let range = max_distance - ref_distance;
                    let dist = distance - ref_distance;
                    (1.0 - rolloff * (dist / range)).max(0.0)
                }
            }

            DistanceModel::Inverse {
                ref_distance,
                rolloff,
            } => {
                if distance <= ref_distance {
                    1.0
                } else {
                    ref_distance / (ref_distance + rolloff * (distance - ref_distance))
                }
            }

            DistanceModel::Exponential {
                ref_distance,
                rolloff,
            } => {
                if distance <= ref_distance {
                    1.0
                } else {
                    (distance / ref_distance).powf(-rolloff)
                }
            }
        }
    }
}

/// 听者的位置与朝向
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Listener {
    pub position: Vec3,
    pub forward: Vec3,
    pub up: Vec3,
}

impl Default for Listener {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            forward: Vec3::X,
            up: Vec3::Z,
        }
    }
}

impl From<&SoundOrigin> for Listener {
    fn from(origin: &SoundOrigin) -> Self {
        Self {
            position: origin.position,
            forward: origin.forward(),
            up: Vec3::Z,
        }
    }
}

impl Listener {
    /// 右方向
    pub fn right(&self) -> Vec3 {
        self.forward.cross(self.up).normalize_or_zero()
    }
}

/// 计算后的空间参数
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpatialParams {
    /// 距离衰减后的增益 (0.0 - 1.0)
    pub gain: f32,
    /// 平移 (-1.0 最左, 1.0 最右)
    pub pan: f32,
    pub distance: f32,
}

impl SpatialParams {
    /// 等功率左右声道增益
    pub fn channel_gains(&self) -> (f32, f32) {
        pan_gains(self.pan)
    }

    /// 换算为通道音量与分离度
    ///
    /// 增益为 0 时听不到，返回 `None`。
    pub fn to_adjusted(&self, chanvol: i32) -> Option<AdjustedParams> {
        let volume = (chanvol as f32 * self.gain).round() as i32;
        if volume <= 0 {
            return None;
        }
        let separation = (NORM_SEP as f32 + self.pan * 127.0).round() as i32;
        Some(AdjustedParams {
            volume,
            separation: separation.clamp(0, 255),
            priority: 127 - volume,
        })
    }
}

/// 等功率平移：pan 为 0 时左右各 √½
pub fn pan_gains(pan: f32) -> (f32, f32) {
    let pan = pan.clamp(-1.0, 1.0);
    (((1.0 - pan) / 2.0).sqrt(), ((1.0 + pan) / 2.0).sqrt())
}

/// 计算声源相对听者的空间参数
pub fn calculate_params(listener: &Listener, source: Vec3, model: &DistanceModel) -> SpatialParams {
    let relative = source - listener.position;
    let distance = relative.length();
    let direction = relative.normalize_or_zero();

    // 方位角：方向在右方向上的投影
    let azimuth = listener.right().dot(direction).clamp(-1.0, 1.0).asin();
    let pan = (azimuth / std::f32::consts::FRAC_PI_2).clamp(-1.0, 1.0);

    SpatialParams {
        gain: model.calculate_gain(distance),
        pan,
        distance,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_model_linear() {
        let model = DistanceModel::Linear {
            ref_distance: 1.0,
            max_distance: 10.0,
            rolloff: 1.0,
        };

        assert!((model.calculate_gain(0.0) - 1.0).abs() < 0.001);
        assert!((model.calculate_gain(1.0) - 1.0).abs() < 0.001);
        assert!((model.calculate_gain(5.5) - 0.5).abs() < 0.001);
        assert!((model.calculate_gain(10.0) - 0.0).abs() < 0.001);
        assert!((model.calculate_gain(15.0) - 0.0).abs() < 0.001);
    }

    #[test]
    fn test_distance_model_inverse() {
        let model = DistanceModel::Inverse {
            ref_distance: 1.0,
            rolloff: 1.0,
        };

        assert!((model.calculate_gain(1.0) - 1.0).abs() < 0.001);
        assert!((model.calculate_gain(2.0) - 0.5).abs() < 0.001);
        assert!((model.calculate_gain(10.0) - 0.1).abs() < 0.001);
    }

    #[test]
    fn test_default_model_matches_classic_range() {
        let model = DistanceModel::default();
        assert_eq!(model.calculate_gain(150.0), 1.0);
        assert!((model.calculate_gain(700.0) - 0.5).abs() < 0.001);
        assert_eq!(model.calculate_gain(1300.0), 0.0);
    }

    #[test]
    fn test_listener_from_origin() {
        let listener = Listener::from(&SoundOrigin::new(Vec3::ZERO, 0.0));
        // 面向 +x 时右侧是 -y
        assert!((listener.right() - Vec3::NEG_Y).length() < 1e-6);
    }

    #[test]
    fn test_source_on_the_right_pans_right() {
        let listener = Listener::default();
        let params = calculate_params(&listener, Vec3::new(0.0, -300.0, 0.0), &DistanceModel::default());

        assert!((params.pan - 1.0).abs() < 1e-4);
        assert!((params.distance - 300.0).abs() < 1e-4);
        let (left, right) = params.channel_gains();
        assert!(right > left);
        assert!(left.abs() < 1e-3);
    }

    #[test]
    fn test_source_ahead_is_centered() {
        let listener = Listener::default();
        let params = calculate_params(&listener, Vec3::new(100.0, 0.0, 0.0), &DistanceModel::None);
        assert!(params.pan.abs() < 1e-6);
        let (left, right) = params.channel_gains();
        assert!((left - right).abs() < 1e-6);
        assert!((left * left + right * right - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_to_adjusted() {
        let params = SpatialParams {
            gain: 0.5,
            pan: -1.0,
            distance: 700.0,
        };
        let adjusted = params.to_adjusted(100).unwrap();
        assert_eq!(adjusted.volume, 50);
        assert_eq!(adjusted.separation, 1);
        assert_eq!(adjusted.priority, 77);

        let silent = SpatialParams {
            gain: 0.0,
            ..params
        };
        assert_eq!(silent.to_adjusted(100), None);
    }
}
