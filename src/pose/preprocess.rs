use ndarray::Array4;
use opencv::{
    core::{self, Mat, Scalar, Size, Vec3f, CV_32FC3},
    imgproc,
    prelude::*,
};

/// レターボックス変換のパラメータ（モデル入力座標 → フレーム座標の逆変換用）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxInfo {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
}

impl LetterboxInfo {
    /// モデル入力座標をフレーム座標に戻す
    pub fn to_frame(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// BGR Mat → レターボックス済み NCHW [1, 3, size, size] テンソル (0.0〜1.0)
///
/// アスペクト比を保ってリサイズし、余白をグレー(114)で埋める。
pub fn letterbox_nchw(frame: &Mat, size: i32) -> opencv::Result<(Array4<f32>, LetterboxInfo)> {
    let frame_w = frame.cols();
    let frame_h = frame.rows();
    let scale = (size as f32 / frame_w as f32).min(size as f32 / frame_h as f32);
    let new_w = ((frame_w as f32 * scale).round() as i32).clamp(1, size);
    let new_h = ((frame_h as f32 * scale).round() as i32).clamp(1, size);
    let pad_x = (size - new_w) / 2;
    let pad_y = (size - new_h) / 2;

    let mut resized = Mat::default();
    imgproc::resize(frame, &mut resized, Size::new(new_w, new_h), 0.0, 0.0, imgproc::INTER_LINEAR)?;

    let mut padded = Mat::default();
    core::copy_make_border(
        &resized,
        &mut padded,
        pad_y,
        size - new_h - pad_y,
        pad_x,
        size - new_w - pad_x,
        core::BORDER_CONSTANT,
        Scalar::all(114.0),
    )?;

    let tensor = bgr_to_nchw(&padded, 0.0, 1.0 / 255.0)?;

    Ok((
        tensor,
        LetterboxInfo {
            scale,
            pad_x: pad_x as f32,
            pad_y: pad_y as f32,
        },
    ))
}

/// 正方形のBGR Mat → NCHW [1, 3, size, size] テンソル（RGB、`(v - mean) * scale`）
pub fn bgr_to_nchw(square: &Mat, mean: f32, scale: f32) -> opencv::Result<Array4<f32>> {
    let s = square.rows() as usize;

    let mut rgb = Mat::default();
    imgproc::cvt_color_def(square, &mut rgb, imgproc::COLOR_BGR2RGB)?;

    let mut float_mat = Mat::default();
    rgb.convert_to(&mut float_mat, CV_32FC3, 1.0, 0.0)?;

    let pixels = float_mat.data_typed::<Vec3f>()?;
    let mut tensor = Array4::<f32>::zeros((1, 3, s, s));
    for y in 0..s {
        for x in 0..s {
            let px = pixels[y * s + x];
            for c in 0..3 {
                tensor[[0, c, y, x]] = (px[c] - mean) * scale;
            }
        }
    }
    Ok(tensor)
}
