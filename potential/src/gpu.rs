//! The interaction sum as a `wgpu` compute shader in double precision.
//!
//! One invocation per lattice site gathers over the carrier set with the same displacement
//! convention and table layout as [`CpuBackend`](crate::cpu::CpuBackend). The device must
//! expose `SHADER_F64`.

use bytemuck::{Pod, Zeroable};
use common::{
    error::{Error, Result},
    messages::PointCharge,
};
use lattice::{BoundaryPolicy, InteractionTable, Lattice};
use log::{debug, info};
use wgpu::util::DeviceExt;

use crate::backend::{check_arguments, PotentialComputeBackend};

/// Invocations per workgroup; must match `@workgroup_size` in [`SHADER`].
const WORKGROUP_SIZE: u32 = 64;

/// Largest workgroup count per dispatch dimension guaranteed by `wgpu` default limits.
const MAX_WORKGROUPS_PER_DIM: u32 = 65_535;

/// Per-site gather of the charge-weighted interaction table.
const SHADER: &str = r"
enable f64;

struct Params {
    width: u32,
    height: u32,
    depth: u32,
    periodic: u32,
    n_carriers: u32,
    ex: u32,
    ey: u32,
    ez: u32,
    row: u32,
    _pad0: u32,
    _pad1: u32,
    _pad2: u32,
}

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var<storage, read> table: array<f64>;
@group(0) @binding(2) var<storage, read> sites: array<u32>;
@group(0) @binding(3) var<storage, read> charges: array<i32>;
@group(0) @binding(4) var<storage, read_write> out: array<f64>;

fn offset(a: u32, b: u32, n: u32) -> u32 {
    var d = i32(b) - i32(a);
    if (params.periodic != 0u) {
        let m = i32(n);
        d = ((d % m) + m) % m;
        if (d > m / 2) {
            d = d - m;
        }
    }
    return u32(abs(d));
}

@compute @workgroup_size(64)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let site = gid.x + gid.y * params.row;
    let plane = params.width * params.height;
    if (site >= plane * params.depth) {
        return;
    }
    let x = site % params.width;
    let y = (site / params.width) % params.height;
    let z = site / plane;

    var phi = f64(0.0);
    for (var i = 0u; i < params.n_carriers; i = i + 1u) {
        let c = sites[i];
        let dx = offset(c % params.width, x, params.width);
        let dy = offset((c / params.width) % params.height, y, params.height);
        let dz = offset(c / plane, z, params.depth);
        if (dx < params.ex && dy < params.ey && dz < params.ez) {
            phi = phi + f64(charges[i]) * table[(dz * params.ey + dy) * params.ex + dx];
        }
    }
    out[site] = phi;
}
";

/// Uniform parameters of [`SHADER`], padded to 16 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
struct Params {
    /// Lattice extent along x.
    width: u32,
    /// Lattice extent along y.
    height: u32,
    /// Lattice extent along z.
    depth: u32,
    /// Non-zero for periodic boundaries.
    periodic: u32,
    /// Number of carriers in the storage buffers.
    n_carriers: u32,
    /// Table extent along x.
    ex: u32,
    /// Table extent along y.
    ey: u32,
    /// Table extent along z.
    ez: u32,
    /// Invocations per dispatch row, `workgroups_x * WORKGROUP_SIZE`.
    row: u32,
    /// Padding.
    _pad: [u32; 3],
}

/// Splits `n` invocations into an `(x, y)` workgroup grid within the per-dimension limit.
fn split_workgroups(n: u32) -> (u32, u32) {
    let groups = n.div_ceil(WORKGROUP_SIZE).max(1);
    if groups <= MAX_WORKGROUPS_PER_DIM {
        (groups, 1)
    } else {
        let x = MAX_WORKGROUPS_PER_DIM;
        (x, groups.div_ceil(x))
    }
}

/// Converts a count to `u32`, failing if it does not fit a shader index.
fn to_u32(value: usize, what: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::Backend(format!("{what} = {value} exceeds the shader index range")))
}

/// The table uploaded to the device, kept until the table changes.
struct UploadedTable {
    /// Host copy used to detect changes.
    energies: Vec<f64>,
    /// Device copy.
    buffer: wgpu::Buffer,
}

/// Offloads the interaction sum to an f64-capable GPU.
pub struct GpuBackend {
    /// The adapter name for logs.
    adapter_name: String,
    /// The logical device.
    device: wgpu::Device,
    /// Its submission queue.
    queue: wgpu::Queue,
    /// The compiled [`SHADER`].
    pipeline: wgpu::ComputePipeline,
    /// The last uploaded interaction table.
    table: Option<UploadedTable>,
}

impl GpuBackend {
    /// Opens the first adapter supporting `SHADER_F64` and compiles the shader.
    ///
    /// # Errors
    /// [`Error::Backend`] if no adapter supports double precision or device creation fails.
    pub fn new() -> Result<Self> {
        futures::executor::block_on(Self::new_async())
    }

    /// Asynchronous device creation behind [`GpuBackend::new`].
    async fn new_async() -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let adapter = instance
            .enumerate_adapters(wgpu::Backends::all())
            .into_iter()
            .find(|adapter| adapter.features().contains(wgpu::Features::SHADER_F64))
            .ok_or_else(|| Error::Backend("no GPU adapter with SHADER_F64 support".to_string()))?;
        let adapter_name = adapter.get_info().name;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("potential device"),
                    required_features: wgpu::Features::SHADER_F64,
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await
            .map_err(|e| Error::Backend(format!("device creation on {adapter_name} failed: {e}")))?;

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("potential gather"),
            source: wgpu::ShaderSource::Wgsl(SHADER.into()),
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("potential gather"),
            layout: None,
            module: &module,
            entry_point: "main",
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });
        info!("opened GPU adapter {adapter_name}");

        Ok(Self {
            adapter_name,
            device,
            queue,
            pipeline,
            table: None,
        })
    }

    /// The adapter this backend runs on.
    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    /// Uploads `table` unless the same table is already resident.
    fn upload_table(&mut self, table: &InteractionTable) {
        let stale = self
            .table
            .as_ref()
            .map_or(true, |uploaded| uploaded.energies != table.energies());
        if stale {
            debug!("uploading interaction table of {} entries", table.energies().len());
            let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("interaction table"),
                contents: bytemuck::cast_slice(table.energies()),
                usage: wgpu::BufferUsages::STORAGE,
            });
            self.table = Some(UploadedTable {
                energies: table.energies().to_vec(),
                buffer,
            });
        }
    }

    /// Copies `source` into a mappable buffer and reads it back.
    fn read_back(&self, source: &wgpu::Buffer, out: &mut [f64]) -> Result<()> {
        let size = std::mem::size_of_val(out) as u64;
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("potential readback"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("readback") });
        encoder.copy_buffer_to_buffer(source, 0, &staging, 0, size);
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|_| Error::Backend("GPU map callback was dropped".to_string()))?
            .map_err(|e| Error::Backend(format!("GPU buffer mapping failed: {e}")))?;

        {
            let data = slice.get_mapped_range();
            for (value, chunk) in out.iter_mut().zip(data.chunks_exact(8)) {
                *value = bytemuck::pod_read_unaligned(chunk);
            }
        }
        staging.unmap();
        Ok(())
    }
}

impl PotentialComputeBackend for GpuBackend {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn recompute(
        &mut self,
        lattice: &Lattice,
        table: &InteractionTable,
        carriers: &[PointCharge],
        out: &mut [f64],
    ) -> Result<()> {
        check_arguments(lattice, table, out)?;
        if table.is_disabled() || carriers.is_empty() {
            out.fill(0.0);
            return Ok(());
        }

        let volume = to_u32(lattice.volume(), "volume")?;
        let (groups_x, groups_y) = split_workgroups(volume);
        let extent = table.extent();
        let params = Params {
            width: to_u32(lattice.width(), "width")?,
            height: to_u32(lattice.height(), "height")?,
            depth: to_u32(lattice.depth(), "depth")?,
            periodic: u32::from(lattice.boundary() == BoundaryPolicy::Periodic),
            n_carriers: to_u32(carriers.len(), "carriers")?,
            ex: to_u32(extent[0], "table extent")?,
            ey: to_u32(extent[1], "table extent")?,
            ez: to_u32(extent[2], "table extent")?,
            row: groups_x * WORKGROUP_SIZE,
            _pad: [0; 3],
        };
        let sites = carriers
            .iter()
            .map(|c| to_u32(c.site, "site"))
            .collect::<Result<Vec<_>>>()?;
        let charges: Vec<i32> = carriers.iter().map(|c| i32::from(c.charge)).collect();

        self.upload_table(table);
        let Some(uploaded) = &self.table else {
            return Err(Error::Backend("interaction table missing after upload".to_string()));
        };
        let storage = |label: &str, contents: &[u8]| {
            self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage: wgpu::BufferUsages::STORAGE,
            })
        };
        let params_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("params"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let sites_buffer = storage("carrier sites", bytemuck::cast_slice(&sites));
        let charges_buffer = storage("carrier charges", bytemuck::cast_slice(&charges));
        let out_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("potential"),
            size: std::mem::size_of_val(out) as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        let layout = self.pipeline.get_bind_group_layout(0);
        let buffers = [&params_buffer, &uploaded.buffer, &sites_buffer, &charges_buffer, &out_buffer];
        let entries: Vec<wgpu::BindGroupEntry> = buffers
            .iter()
            .enumerate()
            .map(|(i, buffer)| wgpu::BindGroupEntry {
                binding: i as u32,
                resource: buffer.as_entire_binding(),
            })
            .collect();
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("potential gather"),
            layout: &layout,
            entries: &entries,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("potential gather") });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("potential gather"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(groups_x, groups_y, 1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));

        self.read_back(&out_buffer, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_workgroups() {
        assert_eq!(split_workgroups(1), (1, 1));
        assert_eq!(split_workgroups(64 * 10), (10, 1));
        assert_eq!(split_workgroups(64 * 65_536), (65_535, 2));
    }

    #[test]
    fn test_params_are_uniform_aligned() {
        assert_eq!(std::mem::size_of::<Params>() % 16, 0);
    }
}
