//! 体数据文件的加载.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use ndarray::{Array2, ArrayD};
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use sha2::{Digest, Sha256};

use super::{diagonal_affine, ImageData};
use crate::LoadError;

/// 支持的文件格式.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Format {
    Nifti,
    Npy,
}

impl Format {
    fn detect(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        if name.ends_with(".nii") || name.ends_with(".nii.gz") {
            Some(Format::Nifti)
        } else if name.ends_with(".npy") {
            Some(Format::Npy)
        } else {
            None
        }
    }
}

impl ImageData {
    /// 按扩展名打开体数据文件. `.npy` 文件不携带间距信息, 此时必须提供 `npy_spacing`;
    /// 对 NIfTI 文件该参数被忽略.
    pub fn open<P: AsRef<Path>>(path: P, npy_spacing: Option<[f64; 3]>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        match Format::detect(path) {
            Some(Format::Nifti) => Self::open_nifti(path),
            Some(Format::Npy) => {
                let spacing = npy_spacing.ok_or_else(|| LoadError::MissingSpacing(path.to_owned()))?;
                Self::open_npy(path, spacing)
            }
            None => Err(LoadError::Extension(path.to_owned())),
        }
    }

    /// 打开 nii 文件格式 (`.nii` 或 `.nii.gz`) 的体数据. 如果打开成功, 则返回 `Ok(Self)`,
    /// 否则返回 `Err`.
    ///
    /// 体素值以 `f32` 保存 (已应用 header 中的线性缩放), 轴顺序保持 `[x, y, z]`.
    /// 体素间距取自 `pixdim[1..=3]`, 仿射矩阵由 [`affine_from_header`] 给出.
    pub fn open_nifti<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(LoadError::Missing(path.to_owned()));
        }
        if Format::detect(path) != Some(Format::Nifti) {
            return Err(LoadError::Extension(path.to_owned()));
        }
        let checksum = file_checksum(path)?;

        let obj = ReaderOptions::new().read_file(path)?;
        let header = obj.header().clone();
        let data = obj.into_volume().into_ndarray::<f32>()?;

        // nifti 的数据本身按列优先存储, 这里统一转成行优先, 后续线性索引才有意义.
        let data = data.as_standard_layout().into_owned();

        let [_, sx, sy, sz, ..] = header.pixdim;
        let spacing = [f64::from(sx), f64::from(sy), f64::from(sz)];
        Ok(ImageData::new(data, affine_from_header(&header), spacing)
            .with_checksum(checksum)
            .with_source(path))
    }

    /// 打开 `.npy` 格式的体数据. 元素类型可以是 `f32` 或 `f64`.
    ///
    /// 仿射矩阵取 `diag(spacing, 1)`.
    pub fn open_npy<P: AsRef<Path>>(path: P, spacing: [f64; 3]) -> Result<Self, LoadError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(LoadError::Missing(path.to_owned()));
        }
        let checksum = file_checksum(path)?;

        let data = match ndarray_npy::read_npy::<_, ArrayD<f32>>(path) {
            Ok(data) => data,
            Err(e) => match ndarray_npy::read_npy::<_, ArrayD<f64>>(path) {
                Ok(data) => data.mapv(|v| v as f32),
                Err(_) => return Err(e.into()),
            },
        };

        Ok(ImageData::new(data, diagonal_affine(spacing), spacing)
            .with_checksum(checksum)
            .with_source(path))
    }
}

/// 计算文件的 SHA-256 校验和, 返回小写十六进制串.
pub fn file_checksum<P: AsRef<Path>>(path: P) -> io::Result<String> {
    let mut reader = BufReader::with_capacity(8192, File::open(path)?);
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// 从 NIfTI header 恢复体素索引 -> 物理坐标的仿射矩阵.
///
/// 1. `sform_code > 0` 时直接使用 `srow_{x, y, z}`;
/// 2. 否则 `qform_code > 0` 时由四元数, `pixdim` 和 `qoffset` 构造;
/// 3. 否则退化为 `diag(pixdim[1], pixdim[2], pixdim[3], 1)`.
pub(crate) fn affine_from_header(h: &NiftiHeader) -> Array2<f64> {
    let mut affine = Array2::<f64>::eye(4);
    if h.sform_code > 0 {
        for (row, srow) in [h.srow_x, h.srow_y, h.srow_z].iter().enumerate() {
            for (col, v) in srow.iter().enumerate() {
                affine[(row, col)] = f64::from(*v);
            }
        }
        return affine;
    }

    let [qfac, dx, dy, dz, ..] = h.pixdim.map(f64::from);
    if h.qform_code > 0 {
        let (b, c, d) = (
            f64::from(h.quatern_b),
            f64::from(h.quatern_c),
            f64::from(h.quatern_d),
        );
        let a = (1.0 - (b * b + c * c + d * d)).max(0.0).sqrt();
        let rot = [
            [
                a * a + b * b - c * c - d * d,
                2.0 * (b * c - a * d),
                2.0 * (b * d + a * c),
            ],
            [
                2.0 * (b * c + a * d),
                a * a + c * c - b * b - d * d,
                2.0 * (c * d - a * b),
            ],
            [
                2.0 * (b * d - a * c),
                2.0 * (c * d + a * b),
                a * a + d * d - b * b - c * c,
            ],
        ];
        // NIfTI 约定: qfac 只能是 1 或 -1, 存成 0 时按 1 处理.
        let qfac = if qfac < 0.0 { -1.0 } else { 1.0 };
        let scale = [dx, dy, dz * qfac];
        for (row, r) in rot.iter().enumerate() {
            for (col, v) in r.iter().enumerate() {
                affine[(row, col)] = v * scale[col];
            }
        }
        affine[(0, 3)] = f64::from(h.quatern_x);
        affine[(1, 3)] = f64::from(h.quatern_y);
        affine[(2, 3)] = f64::from(h.quatern_z);
        return affine;
    }

    affine[(0, 0)] = dx;
    affine[(1, 1)] = dy;
    affine[(2, 2)] = dz;
    affine
}
