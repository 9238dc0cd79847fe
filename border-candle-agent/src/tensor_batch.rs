use anyhow::{bail, Context, Result};
use border_core::multistep_replay_buffer::BatchBase;
use candle_core::{DType, Device, IndexOp, Tensor};

/// A buffer consisting of a [`Tensor`] of shape `[capacity, dim]`.
///
/// The internal tensor lives on the CPU and is allocated with the dimension of
/// the first pushed rows. Rows are written in place with `slice_set` and sampled
/// with `index_select`.
///
/// [`Tensor`]: https://docs.rs/candle-core/0.8.4/candle_core/struct.Tensor.html
#[derive(Clone, Debug)]
pub struct TensorBatch {
    buf: Option<Tensor>,
    capacity: usize,
}

impl TensorBatch {
    /// Creates a batch of a single row.
    pub fn from_row(row: Vec<f32>) -> Self {
        let dim = row.len();
        // Shapes agree by construction, so the conversion cannot fail.
        let buf = Tensor::from_vec(row, (1, dim), &Device::Cpu).ok();
        Self { buf, capacity: 1 }
    }

    /// Creates a batch from a flat vector of rows of length `dim`.
    pub fn from_rows(buf: Vec<f32>, dim: usize) -> Result<Self> {
        if dim == 0 || buf.len() % dim != 0 {
            bail!("{} values cannot be split into rows of {}", buf.len(), dim);
        }
        let n = buf.len() / dim;
        Self::from_tensor(Tensor::from_vec(buf, (n, dim), &Device::Cpu)?)
    }

    /// Creates a batch from a tensor of shape `[n_rows, dim]`.
    pub fn from_tensor(t: Tensor) -> Result<Self> {
        let (capacity, _) = t.dims2()?;
        Ok(Self {
            buf: Some(t.to_dtype(DType::F32)?),
            capacity,
        })
    }

    /// Dimension of a row. `0` until the first rows are pushed.
    pub fn dim(&self) -> usize {
        self.buf
            .as_ref()
            .and_then(|t| t.dims2().ok())
            .map_or(0, |(_, dim)| dim)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.capacity
    }

    /// Returns `true` if the batch has no rows.
    pub fn is_empty(&self) -> bool {
        self.capacity == 0
    }

    /// Returns the `ix`-th row.
    pub fn row(&self, ix: usize) -> Result<Vec<f32>> {
        if ix >= self.capacity {
            bail!("Row {} is not available (capacity {})", ix, self.capacity);
        }
        let buf = self.buf.as_ref().context("No rows in the batch")?;
        Ok(buf.i(ix)?.to_vec1::<f32>()?)
    }

    /// Returns the rows as a tensor of shape `[n_rows, dim]` on the given device.
    pub fn to_tensor(&self, device: &Device) -> Result<Tensor> {
        match &self.buf {
            Some(buf) => Ok(buf.to_device(device)?),
            None => bail!("Empty batch cannot be converted into a tensor"),
        }
    }
}

impl BatchBase for TensorBatch {
    fn new(capacity: usize) -> Self {
        Self {
            buf: None,
            capacity,
        }
    }

    /// Pushes given rows, wrapping around at the end of the buffer.
    ///
    /// If the internal buffer is empty, it will be initialized with the shape
    /// `[capacity, data.dim()]`.
    fn push(&mut self, ix: usize, data: Self) -> Result<()> {
        let data = data.buf.context("Cannot push a batch without rows")?;
        let (n, dim) = data.dims2()?;
        if n == 0 || dim == 0 {
            bail!("Cannot push an empty batch of shape [{}, {}]", n, dim);
        }
        if n > self.capacity {
            bail!("Cannot push {} rows into a batch of capacity {}", n, self.capacity);
        }

        let buf = match &self.buf {
            Some(buf) => {
                let (_, dim_) = buf.dims2()?;
                if dim_ != dim {
                    bail!("Row dimension mismatch: {} vs {}", dim_, dim);
                }
                buf.clone()
            }
            None => {
                let buf = Tensor::zeros((self.capacity, dim), DType::F32, &Device::Cpu)?;
                self.buf = Some(buf.clone());
                buf
            }
        };

        let data = data.to_dtype(DType::F32)?.to_device(&Device::Cpu)?;
        let ix = ix % self.capacity;
        if ix + n > self.capacity {
            let n1 = self.capacity - ix;
            buf.slice_set(&data.i(..n1)?.contiguous()?, 0, ix)?;
            buf.slice_set(&data.i(n1..)?.contiguous()?, 0, 0)?;
        } else {
            buf.slice_set(&data.contiguous()?, 0, ix)?;
        }

        Ok(())
    }

    fn sample(&self, ixs: &[usize]) -> Result<Self> {
        let buf = self.buf.as_ref().context("Cannot sample from an empty batch")?;
        if let Some(ix) = ixs.iter().find(|&&ix| ix >= self.capacity) {
            bail!("Row {} is not available (capacity {})", ix, self.capacity);
        }
        let capacity = ixs.len();
        let ixs = Tensor::from_vec(
            ixs.iter().map(|&ix| ix as u32).collect::<Vec<_>>(),
            capacity,
            buf.device(),
        )?;
        Ok(Self {
            buf: Some(buf.index_select(&ixs, 0)?),
            capacity,
        })
    }
}

impl From<Vec<f32>> for TensorBatch {
    fn from(row: Vec<f32>) -> Self {
        Self::from_row(row)
    }
}
