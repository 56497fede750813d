use super::BvalTable;
use crate::io::VolumeLoader;
use crate::prelude::{StageError, StageResult};
use crate::telemetry::LogManager;
use crate::tools::ToolRunner;
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Where the four DTI products are written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DtiOutputs {
    pub fa: PathBuf,
    pub rd: PathBuf,
    pub adc: PathBuf,
    pub b0: PathBuf,
}

impl Default for DtiOutputs {
    fn default() -> Self {
        Self {
            fa: PathBuf::from("fa_map.nii"),
            rd: PathBuf::from("rd_map.nii"),
            adc: PathBuf::from("adc_map.nii"),
            b0: PathBuf::from("b0_image.nii"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DtiSummary {
    pub bvalues: usize,
    pub zeroed: usize,
    pub outputs: DtiOutputs,
}

/// FA/RD/ADC maps and a mean b=0 image, computed by MRtrix3 tools.
pub struct DtiWorkflow<R> {
    loader: VolumeLoader<R>,
    logger: LogManager,
}

impl<R: ToolRunner> DtiWorkflow<R> {
    pub fn new(loader: VolumeLoader<R>) -> Self {
        Self {
            loader,
            logger: LogManager::new("dti"),
        }
    }

    fn tool(&self, tool: &str, args: &[&OsStr]) -> StageResult<()> {
        self.logger.record(&format!("running {}", tool));
        self.loader.runner().run(tool, args)
    }

    pub fn run(&self, scan: &Path, outputs: &DtiOutputs, scratch: &Path) -> StageResult<DtiSummary> {
        let nii = self.loader.convert(scan, "dti", scratch)?;
        let bval = nii.with_extension("bval");
        let bvec = nii.with_extension("bvec");
        for sidecar in [&bval, &bvec] {
            if !sidecar.is_file() {
                return Err(StageError::ConversionFailure(format!(
                    "`{}` wrote no gradient table {}",
                    self.loader.converter(),
                    sidecar.display()
                )));
            }
        }

        let table = BvalTable::read(&bval)?;
        let cleaned = table.thresholded();
        let zeroed = table
            .values()
            .zip(cleaned.values())
            .filter(|(before, after)| before != after)
            .count();
        cleaned.write(&bval)?;
        self.logger.record(&format!(
            "{} of {} b-values zeroed",
            zeroed,
            table.len()
        ));

        let mih = scratch.join("dti_scan.mih");
        let tensor = scratch.join("dti_tensor.mih");
        let b0s = scratch.join("b0s.mih");
        self.tool(
            "mrconvert",
            &[
                OsStr::new("-fslgrad"),
                bvec.as_os_str(),
                bval.as_os_str(),
                nii.as_os_str(),
                mih.as_os_str(),
            ],
        )?;
        self.tool("dwi2tensor", &[mih.as_os_str(), tensor.as_os_str()])?;
        self.tool(
            "tensor2metric",
            &[
                OsStr::new("-fa"),
                outputs.fa.as_os_str(),
                OsStr::new("-rd"),
                outputs.rd.as_os_str(),
                OsStr::new("-adc"),
                outputs.adc.as_os_str(),
                tensor.as_os_str(),
            ],
        )?;
        self.tool(
            "dwiextract",
            &[OsStr::new("-bzero"), mih.as_os_str(), b0s.as_os_str()],
        )?;
        self.tool(
            "mrmath",
            &[
                b0s.as_os_str(),
                OsStr::new("mean"),
                outputs.b0.as_os_str(),
                OsStr::new("-axis"),
                OsStr::new("3"),
            ],
        )?;

        Ok(DtiSummary {
            bvalues: table.len(),
            zeroed,
            outputs: outputs.clone(),
        })
    }
}
