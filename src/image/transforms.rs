use crate::utils::error::ScanError;
use crate::Result;
use image::{DynamicImage, GrayImage, ImageBuffer, Luma};

/// 定点插值系数位数（系数总和为 1 << 11）
const COEF_BITS: u32 = 11;
const COEF_SCALE: i32 = 1 << COEF_BITS;

/// 图像变换工具集
pub struct ImageTransforms;

impl ImageTransforms {
    /// 灰度转换
    ///
    /// 彩色图使用 ITU-R 601-2 亮度权重的 16 位定点形式：
    /// `L = (R*19595 + G*38470 + B*7471 + 0x8000) >> 16`。
    /// 训练数据就是按这个权重生成的，不能换成 `image` 自带的 Rec.709 权重。
    /// 已经是 8 位灰度的图像原样返回。
    /// 16 位灰度按数值截断到 0..=255（与 PIL 的 `I;16 -> L` 一致），不做 1/257 缩放。
    pub fn to_grayscale(image: &DynamicImage) -> GrayImage {
        match image {
            DynamicImage::ImageLuma8(gray) => gray.clone(),
            DynamicImage::ImageLumaA8(gray_alpha) => {
                let (width, height) = gray_alpha.dimensions();
                ImageBuffer::from_fn(width, height, |x, y| Luma([gray_alpha.get_pixel(x, y)[0]]))
            }
            DynamicImage::ImageLuma16(gray) => {
                let (width, height) = gray.dimensions();
                ImageBuffer::from_fn(width, height, |x, y| {
                    Luma([Self::clip16(gray.get_pixel(x, y)[0])])
                })
            }
            DynamicImage::ImageLumaA16(gray_alpha) => {
                let (width, height) = gray_alpha.dimensions();
                ImageBuffer::from_fn(width, height, |x, y| {
                    Luma([Self::clip16(gray_alpha.get_pixel(x, y)[0])])
                })
            }
            other => {
                let rgb = other.to_rgb8();
                let (width, height) = rgb.dimensions();
                ImageBuffer::from_fn(width, height, |x, y| {
                    let p = rgb.get_pixel(x, y);
                    Luma([Self::luma(p[0], p[1], p[2])])
                })
            }
        }
    }

    #[inline]
    fn clip16(value: u16) -> u8 {
        value.min(u8::MAX as u16) as u8
    }

    #[inline]
    fn luma(r: u8, g: u8, b: u8) -> u8 {
        ((r as u32 * 19595 + g as u32 * 38470 + b as u32 * 7471 + 0x8000) >> 16) as u8
    }

    /// 双线性缩放到固定尺寸（不保持宽高比）
    ///
    /// 像素中心对齐：`src = (dst + 0.5) * scale - 0.5`，越界时夹到边缘像素。
    /// 系数为 11 位定点数，先水平后垂直两遍累加，最后四舍五入回 u8。
    /// 尺寸已经匹配时直接返回副本，因此对目标尺寸是幂等的。
    pub fn resize_bilinear(
        image: &GrayImage,
        target_width: u32,
        target_height: u32,
    ) -> Result<GrayImage> {
        let (src_w, src_h) = image.dimensions();
        if src_w == 0 || src_h == 0 {
            return Err(ScanError::InvalidImage(format!(
                "cannot resize empty image {}x{}",
                src_w, src_h
            )));
        }
        if target_width == 0 || target_height == 0 {
            return Err(ScanError::InvalidInput(format!(
                "invalid resize target {}x{}",
                target_width, target_height
            )));
        }

        if (src_w, src_h) == (target_width, target_height) {
            return Ok(image.clone());
        }

        let x_taps = Self::compute_taps(src_w, target_width);
        let y_taps = Self::compute_taps(src_h, target_height);

        // 水平方向：每一行源数据先插值到目标宽度，缓存结果供垂直方向复用
        let src = image.as_raw();
        let row_stride = src_w as usize;
        let horizontal: Vec<Vec<i32>> = (0..src_h as usize)
            .map(|row| {
                let line = &src[row * row_stride..(row + 1) * row_stride];
                x_taps
                    .iter()
                    .map(|tap| {
                        line[tap.index0] as i32 * tap.weight0 + line[tap.index1] as i32 * tap.weight1
                    })
                    .collect()
            })
            .collect();

        let mut output = Vec::with_capacity(target_width as usize * target_height as usize);
        let rounding = 1i64 << (COEF_BITS * 2 - 1);
        for tap in &y_taps {
            let row0 = &horizontal[tap.index0];
            let row1 = &horizontal[tap.index1];
            for x in 0..target_width as usize {
                let acc = row0[x] as i64 * tap.weight0 as i64 + row1[x] as i64 * tap.weight1 as i64;
                let value = (acc + rounding) >> (COEF_BITS * 2);
                output.push(value.clamp(0, 255) as u8);
            }
        }

        ImageBuffer::from_raw(target_width, target_height, output).ok_or_else(|| {
            ScanError::Internal("resize produced a buffer of unexpected size".to_string())
        })
    }

    /// 计算一个方向上每个目标像素对应的两个源像素及其定点权重
    fn compute_taps(src_len: u32, dst_len: u32) -> Vec<Tap> {
        let scale = src_len as f64 / dst_len as f64;
        let last = src_len as usize - 1;

        (0..dst_len)
            .map(|dst| {
                let pos = (dst as f64 + 0.5) * scale - 0.5;
                let mut index = pos.floor() as i64;
                let mut frac = (pos - index as f64) as f32;

                if index < 0 {
                    index = 0;
                    frac = 0.0;
                }
                if index as usize >= last {
                    index = last as i64;
                    frac = 0.0;
                }

                let weight0 = ((1.0 - frac) * COEF_SCALE as f32).round() as i32;
                let index0 = index as usize;
                Tap {
                    index0,
                    index1: (index0 + 1).min(last),
                    weight0,
                    weight1: COEF_SCALE - weight0,
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
struct Tap {
    index0: usize,
    index1: usize,
    weight0: i32,
    weight1: i32,
}
