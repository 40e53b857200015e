// SPDX-License-Identifier: GPL-3.0-only

//! GPU rendering backend
//!
//! Converts rasterized RGBA frames to NV12 with a compute shader:
//!
//! 1. Upload RGBA pixels as a storage buffer
//! 2. One invocation per 2x2 block writes four luma values and one CbCr pair
//! 3. Read both planes back through mapped staging buffers

use super::{BackendKind, RenderBackend};
use crate::constants::GPU_WORKGROUP_SIZE;
use crate::errors::{PipelineError, PipelineResult};
use crate::media::BufferLock;
use crate::media::buffer::chroma_stride;
use image::RgbaImage;
use tracing::{debug, info};
use wgpu::util::DeviceExt;

/// Conversion shader source
pub const SHADER_SOURCE: &str = include_str!("rgba_to_nv12.wgsl");

/// Uniform data for the conversion shader (must match `ConvertParams` in WGSL)
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct ConvertParams {
    width: u32,
    height: u32,
    blocks_x: u32,
    blocks_y: u32,
}

/// Buffer size limits of the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BufferLimits {
    max_binding_size: u64,
    max_buffer_size: u64,
}

impl BufferLimits {
    fn from_device(limits: &wgpu::Limits) -> Self {
        Self {
            max_binding_size: limits.max_storage_buffer_binding_size as u64,
            max_buffer_size: limits.max_buffer_size,
        }
    }

    /// Reject frames whose buffers the device cannot bind
    ///
    /// The RGBA input and the luma output are the largest buffers, four
    /// bytes per pixel each.
    fn check(&self, width: u32, height: u32) -> PipelineResult<()> {
        let largest = width as u64 * height as u64 * 4;
        let limit = self.max_binding_size.min(self.max_buffer_size);
        if largest > limit {
            return Err(PipelineError::Render(format!(
                "{}x{} frame needs {} byte GPU buffers, device limit is {}",
                width, height, largest, limit
            )));
        }
        Ok(())
    }
}

/// wgpu compute backend
pub struct GpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    limits: BufferLimits,
    adapter_name: String,
    api: wgpu::Backend,
}

impl GpuBackend {
    /// Create the backend, blocking on device creation
    pub fn new() -> PipelineResult<Self> {
        pollster::block_on(Self::new_async())
    }

    pub async fn new_async() -> PipelineResult<Self> {
        info!("Initializing GPU render backend");

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::VULKAN,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| PipelineError::ContextInit(format!("no GPU adapter: {}", e)))?;

        let adapter_info = adapter.get_info();
        let adapter_limits = adapter.limits();
        info!(
            adapter = %adapter_info.name,
            backend = ?adapter_info.backend,
            "GPU adapter selected for rendering"
        );

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("nv12_render_device"),
                required_features: wgpu::Features::empty(),
                required_limits: adapter_limits,
                memory_hints: wgpu::MemoryHints::Performance,
                ..Default::default()
            })
            .await
            .map_err(|e| PipelineError::ContextInit(format!("failed to create GPU device: {}", e)))?;

        let limits = BufferLimits::from_device(&device.limits());
        debug!(
            max_binding_size = limits.max_binding_size,
            max_buffer_size = limits.max_buffer_size,
            "GPU buffer limits"
        );

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("rgba_to_nv12_shader"),
            source: wgpu::ShaderSource::Wgsl(SHADER_SOURCE.into()),
        });

        let storage_entry = |binding: u32, read_only: bool| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("rgba_to_nv12_bind_group_layout"),
            entries: &[
                // RGBA input
                storage_entry(0, true),
                // Luma output (one u32 per pixel)
                storage_entry(1, false),
                // Chroma output (one packed CbCr u32 per block)
                storage_entry(2, false),
                // Uniform parameters
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("rgba_to_nv12_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("rgba_to_nv12_pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        Ok(Self {
            device,
            queue,
            pipeline,
            bind_group_layout,
            limits,
            adapter_name: adapter_info.name,
            api: adapter_info.backend,
        })
    }

    /// Run the conversion, returning (luma words, chroma words) as bytes
    fn convert(&self, image: &RgbaImage) -> PipelineResult<(Vec<u8>, Vec<u8>)> {
        let (width, height) = image.dimensions();
        self.limits.check(width, height)?;
        let blocks_x = width.div_ceil(2);
        let blocks_y = height.div_ceil(2);
        let luma_size = (width as u64) * (height as u64) * 4;
        let chroma_size = (blocks_x as u64) * (blocks_y as u64) * 4;

        let params = ConvertParams {
            width,
            height,
            blocks_x,
            blocks_y,
        };

        let input = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("nv12_rgba_input"),
                contents: image.as_raw(),
                usage: wgpu::BufferUsages::STORAGE,
            });
        let uniforms = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("nv12_params"),
                contents: bytemuck::bytes_of(&params),
                usage: wgpu::BufferUsages::UNIFORM,
            });
        let storage = |label: &str, size: u64| {
            self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            })
        };
        let staging = |label: &str, size: u64| {
            self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };
        let luma = storage("nv12_luma", luma_size);
        let chroma = storage("nv12_chroma", chroma_size);
        let luma_staging = staging("nv12_luma_staging", luma_size);
        let chroma_staging = staging("nv12_chroma_staging", chroma_size);

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("rgba_to_nv12_bind_group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: input.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: luma.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: chroma.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: uniforms.as_entire_binding(),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("rgba_to_nv12_encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("rgba_to_nv12_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(
                blocks_x.div_ceil(GPU_WORKGROUP_SIZE),
                blocks_y.div_ceil(GPU_WORKGROUP_SIZE),
                1,
            );
        }
        encoder.copy_buffer_to_buffer(&luma, 0, &luma_staging, 0, luma_size);
        encoder.copy_buffer_to_buffer(&chroma, 0, &chroma_staging, 0, chroma_size);
        self.queue.submit(Some(encoder.finish()));

        let luma_bytes = self.read_buffer(&luma_staging)?;
        let chroma_bytes = self.read_buffer(&chroma_staging)?;
        Ok((luma_bytes, chroma_bytes))
    }

    fn read_buffer(&self, buffer: &wgpu::Buffer) -> PipelineResult<Vec<u8>> {
        let slice = buffer.slice(..);
        let (sender, receiver) = futures::channel::oneshot::channel();

        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });

        let _ = self.device.poll(wgpu::PollType::wait_indefinitely());

        pollster::block_on(receiver)
            .map_err(|_| PipelineError::Render("buffer mapping was cancelled".into()))?
            .map_err(|e| PipelineError::Render(format!("failed to map buffer: {:?}", e)))?;

        let data = slice.get_mapped_range().to_vec();
        buffer.unmap();
        Ok(data)
    }
}

impl RenderBackend for GpuBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Hardware
    }

    fn describe(&self) -> String {
        format!("{} ({:?})", self.adapter_name, self.api)
    }

    fn render_nv12(&self, image: &RgbaImage, target: &mut BufferLock<'_>) -> PipelineResult<()> {
        let (width, height) = (target.width(), target.height());
        if image.dimensions() != (width, height) || width == 0 || height == 0 {
            return Err(PipelineError::Render(format!(
                "cannot render {}x{} image into {}x{} target",
                image.width(),
                image.height(),
                width,
                height
            )));
        }

        let (luma, chroma) = self.convert(image)?;
        debug!(width, height, "GPU NV12 conversion complete");

        let (y_plane, uv_plane) = target
            .nv12_planes_mut()
            .ok_or_else(|| PipelineError::Render("target is not a complete NV12 buffer".into()))?;

        // Each output word holds one byte value in its low bits
        for (dst, word) in y_plane.iter_mut().zip(luma.chunks_exact(4)) {
            *dst = word[0];
        }

        let uv_stride = chroma_stride(width as usize);
        let blocks_x = uv_stride / 2;
        for (block, word) in chroma.chunks_exact(4).enumerate() {
            let index = (block / blocks_x) * uv_stride + (block % blocks_x) * 2;
            uv_plane[index] = word[0];
            uv_plane[index + 1] = word[1];
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{PixelBuffer, PixelFormat};
    use crate::render::SoftwareBackend;
    use image::Rgba;

    /// Validate that the WGSL shader compiles successfully using naga
    #[test]
    fn test_conversion_shader_validates() {
        let module = match naga::front::wgsl::parse_str(SHADER_SOURCE) {
            Ok(module) => module,
            Err(e) => panic!("Shader parse failed: {:?}", e),
        };
        let info = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        )
        .validate(&module);
        if let Err(e) = info {
            panic!("Shader validation failed: {:?}", e);
        }
    }

    #[test]
    fn test_oversized_frame_is_render_error() {
        let limits = BufferLimits {
            max_binding_size: 64 << 20,
            max_buffer_size: 256 << 20,
        };
        assert!(limits.check(3840, 2160).is_ok());
        assert!(matches!(
            limits.check(7680, 4320),
            Err(PipelineError::Render(_))
        ));

        let small_buffers = BufferLimits {
            max_binding_size: 128 << 20,
            max_buffer_size: 1 << 20,
        };
        assert!(small_buffers.check(1920, 1080).is_err());
    }

    #[test]
    fn test_params_layout() {
        assert_eq!(std::mem::size_of::<ConvertParams>(), 16);
    }

    #[tokio::test]
    async fn test_gpu_matches_software() {
        // This test requires a GPU, so it may be skipped in CI
        let gpu = match GpuBackend::new_async().await {
            Ok(gpu) => gpu,
            Err(e) => {
                println!("Skipping test (no GPU): {}", e);
                return;
            }
        };

        let mut image = RgbaImage::new(7, 5);
        for (x, y, pixel) in image.enumerate_pixels_mut() {
            *pixel = Rgba([(x * 36) as u8, (y * 50) as u8, ((x + y) * 20) as u8, 255]);
        }

        let from_gpu = PixelBuffer::black(7, 5, PixelFormat::Nv12).unwrap();
        let from_cpu = PixelBuffer::black(7, 5, PixelFormat::Nv12).unwrap();
        gpu.render_nv12(&image, &mut from_gpu.lock()).unwrap();
        SoftwareBackend::new()
            .render_nv12(&image, &mut from_cpu.lock())
            .unwrap();

        for (a, b) in from_gpu.to_vec().iter().zip(from_cpu.to_vec().iter()) {
            assert!((*a as i32 - *b as i32).abs() <= 1, "gpu {} cpu {}", a, b);
        }
    }
}
