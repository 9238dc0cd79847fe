//! Utilities.
use anyhow::{anyhow, Result};
use border_core::record::{Record, RecordValue};
use candle_core::{Device, Tensor};
use candle_nn::VarMap;
use log::trace;
use std::{collections::HashMap, sync::MutexGuard};
pub mod actor;
pub mod critic;

fn lock(varmap: &VarMap) -> Result<MutexGuard<HashMap<String, candle_core::Var>>> {
    varmap
        .data()
        .lock()
        .map_err(|_| anyhow!("VarMap lock is poisoned"))
}

/// Apply soft update on variables.
///
/// Variables are identified by their names.
///
/// dest = tau * src + (1.0 - tau) * dest
pub fn track(dest: &VarMap, src: &VarMap, tau: f64) -> Result<()> {
    trace!("track(tau = {})", tau);
    let dest = lock(dest)?;
    let src = lock(src)?;

    for (k, v_dest) in dest.iter() {
        let v_src = src
            .get(k)
            .ok_or_else(|| anyhow!("Variable {} is not found in the source", k))?;
        let t = ((tau * v_src.as_tensor())? + ((1.0 - tau) * v_dest.as_tensor())?)?;
        v_dest.set(&t)?;
    }

    Ok(())
}

/// Returns `true` if the variables of the two maps coincide within `eps`.
pub fn same_values(vm1: &VarMap, vm2: &VarMap, eps: f32) -> Result<bool> {
    let vm1 = lock(vm1)?;
    let vm2 = lock(vm2)?;

    for (k, v1) in vm1.iter() {
        let v2 = match vm2.get(k) {
            Some(v) => v,
            None => return Ok(false),
        };
        let d = (v1.as_tensor() - v2.as_tensor())?
            .abs()?
            .flatten_all()?
            .max(0)?
            .to_scalar::<f32>()?;
        if d > eps {
            return Ok(false);
        }
    }

    Ok(vm1.len() == vm2.len())
}

/// Interface for handling output dimensions.
pub trait OutDim {
    /// Returns the output dimension.
    fn get_out_dim(&self) -> usize;

    /// Sets the output dimension.
    fn set_out_dim(&mut self, v: usize);
}

/// Returns `(mean, min, max)` of the elements of a tensor.
pub fn stats(t: &Tensor) -> Result<(f32, f32, f32)> {
    let v = t.flatten_all()?.to_vec1::<f32>()?;
    if v.is_empty() {
        return Err(anyhow!("Statistics of an empty tensor"));
    }
    let mean = v.iter().sum::<f32>() / v.len() as f32;
    let min = v.iter().fold(f32::INFINITY, |m, x| m.min(*x));
    let max = v.iter().fold(f32::NEG_INFINITY, |m, x| m.max(*x));
    Ok((mean, min, max))
}

/// Inserts `{key}_mean`, `{key}_min` and `{key}_max` of a tensor into a record.
pub fn insert_stats(record: &mut Record, key: &str, t: &Tensor) -> Result<()> {
    let (mean, min, max) = stats(t)?;
    record.insert(format!("{}_mean", key), RecordValue::Scalar(mean));
    record.insert(format!("{}_min", key), RecordValue::Scalar(min));
    record.insert(format!("{}_max", key), RecordValue::Scalar(max));
    Ok(())
}

/// Builds a 1-dimensional tensor of rewards.
pub fn reward(reward: &[f32], device: &Device) -> Result<Tensor> {
    Ok(Tensor::from_slice(reward, (reward.len(),), device)?)
}

/// Builds a 1-dimensional tensor of `1 - is_terminated`.
pub fn not_terminated(is_terminated: &[i8], device: &Device) -> Result<Tensor> {
    let v = is_terminated
        .iter()
        .map(|&d| 1f32 - d as f32)
        .collect::<Vec<_>>();
    Ok(Tensor::from_vec(v, (is_terminated.len(),), device)?)
}
