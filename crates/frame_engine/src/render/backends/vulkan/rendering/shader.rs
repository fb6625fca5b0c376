//! Shader management and graphics pipeline creation
//!
//! SPIR-V is read from disk once during initialization and kept in memory, so a
//! swapchain rebuild can recreate the pipeline without touching the filesystem.

use std::ffi::CStr;
use std::fs::File;
use std::path::Path;

use ash::{vk, Device};

use crate::core::config::ShaderConfig;
use crate::render::backends::vulkan::rendering::vertex_layout::Vertex;
use crate::render::backends::vulkan::{VulkanError, VulkanResult};

const ENTRY_POINT: &CStr = c"main";

/// SPIR-V words for the vertex and fragment stages
#[derive(Debug, Clone)]
pub struct ShaderCode {
    /// Vertex stage words
    pub vertex: Vec<u32>,
    /// Fragment stage words
    pub fragment: Vec<u32>,
}

impl ShaderCode {
    /// Read both stages named by `config`
    pub fn load(config: &ShaderConfig) -> VulkanResult<Self> {
        Ok(Self {
            vertex: read_spirv(&config.vertex_shader_path)?,
            fragment: read_spirv(&config.fragment_shader_path)?,
        })
    }
}

/// Read a SPIR-V binary into properly aligned words
pub fn read_spirv(path: impl AsRef<Path>) -> VulkanResult<Vec<u32>> {
    let path = path.as_ref();
    let mut file = File::open(path).map_err(|e| {
        VulkanError::InitializationFailed(format!("Failed to open shader file {}: {e}", path.display()))
    })?;
    ash::util::read_spv(&mut file).map_err(|e| {
        VulkanError::InitializationFailed(format!("Invalid SPIR-V in {}: {e}", path.display()))
    })
}

/// Shader module wrapper with RAII cleanup
pub struct ShaderModule {
    device: Device,
    module: vk::ShaderModule,
}

impl ShaderModule {
    /// Create shader module from SPIR-V words
    pub fn from_code(device: Device, code: &[u32]) -> VulkanResult<Self> {
        let create_info = vk::ShaderModuleCreateInfo::builder().code(code);
        let module = unsafe { device.create_shader_module(&create_info, None).map_err(VulkanError::Api)? };
        Ok(Self { device, module })
    }

    /// Get shader module handle
    pub const fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    fn stage_info(&self, stage: vk::ShaderStageFlags) -> vk::PipelineShaderStageCreateInfo {
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(stage)
            .module(self.module)
            .name(ENTRY_POINT)
            .build()
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}

/// Viewport covering the whole extent
#[allow(clippy::cast_precision_loss)]
pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// Graphics pipeline and its layout, with RAII cleanup
///
/// Viewport and scissor are baked in, so the pipeline is rebuilt with the swapchain.
pub struct GraphicsPipeline {
    device: Device,
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
}

impl GraphicsPipeline {
    /// Create the quad pipeline for `render_pass` at `extent`
    pub fn new(
        device: Device,
        render_pass: vk::RenderPass,
        shaders: &ShaderCode,
        set_layout: vk::DescriptorSetLayout,
        extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        // Modules are only needed until the pipeline exists
        let vertex_shader = ShaderModule::from_code(device.clone(), &shaders.vertex)?;
        let fragment_shader = ShaderModule::from_code(device.clone(), &shaders.fragment)?;

        let shader_stages = [
            vertex_shader.stage_info(vk::ShaderStageFlags::VERTEX),
            fragment_shader.stage_info(vk::ShaderStageFlags::FRAGMENT),
        ];

        let bindings = [Vertex::binding_description()];
        let attributes = Vertex::attribute_descriptions();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        let viewports = [full_viewport(extent)];
        let scissors = [vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        }];
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewports(&viewports)
            .scissors(&scissors);

        // Projection flips Y, so the quad's counter-clockwise winding survives
        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::BACK)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
            .build()];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let set_layouts = [set_layout];
        let layout_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(&set_layouts);
        let layout = unsafe { device.create_pipeline_layout(&layout_info, None).map_err(VulkanError::Api)? };

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .color_blend_state(&color_blending)
            .layout(layout)
            .render_pass(render_pass)
            .subpass(0)
            .build();

        let created = unsafe { device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None) };
        let pipeline = match created {
            Ok(pipelines) => pipelines.into_iter().next(),
            Err((_, err)) => {
                unsafe { device.destroy_pipeline_layout(layout, None) };
                return Err(VulkanError::Api(err));
            }
        };
        let Some(pipeline) = pipeline else {
            unsafe { device.destroy_pipeline_layout(layout, None) };
            return Err(VulkanError::InitializationFailed("Driver returned no pipeline".to_string()));
        };

        Ok(Self {
            device,
            pipeline,
            layout,
        })
    }

    /// Get pipeline handle
    pub const fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Get layout handle
    pub const fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_viewport_covers_extent() {
        let viewport = full_viewport(vk::Extent2D { width: 800, height: 600 });
        assert_eq!(viewport.width, 800.0);
        assert_eq!(viewport.height, 600.0);
        assert_eq!(viewport.min_depth, 0.0);
        assert_eq!(viewport.max_depth, 1.0);
    }

    #[test]
    fn test_missing_shader_file_is_reported() {
        let err = read_spirv("definitely/not/here.spv").unwrap_err();
        assert!(matches!(err, VulkanError::InitializationFailed(msg) if msg.contains("here.spv")));
    }

    #[test]
    fn test_read_spirv_rejects_truncated_words() {
        let dir = std::env::temp_dir().join(format!("frame_engine_spirv_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let good = dir.join("good.spv");
        let words: [u32; 2] = [0x0723_0203, 0x0001_0000];
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        std::fs::write(&good, bytes).unwrap();
        assert_eq!(read_spirv(&good).unwrap(), words.to_vec());

        let bad = dir.join("bad.spv");
        std::fs::write(&bad, [0u8; 7]).unwrap();
        assert!(read_spirv(&bad).is_err());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
